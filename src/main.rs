fn main() {
    overlay_capture_lib::run()
}
