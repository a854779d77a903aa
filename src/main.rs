fn main() {
    if let Err(err) = focusguard_lib::run() {
        eprintln!("focusguard: {err:#}");
        std::process::exit(1);
    }
}
