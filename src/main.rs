fn main() {
    carebook_lib::run()
}
