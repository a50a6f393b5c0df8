pub mod appointment;
pub mod bed;
pub mod directory;
pub mod enums;
pub mod filters;
pub mod invoice;

pub use appointment::*;
pub use bed::*;
pub use directory::*;
pub use enums::*;
pub use filters::*;
pub use invoice::*;
