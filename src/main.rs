fn main() {
    slidecraft_lib::run()
}
