fn main() {
    if let Err(err) = epi_canon::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
