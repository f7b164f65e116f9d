fn main() {
    if let Err(err) = workstate_lib::run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
