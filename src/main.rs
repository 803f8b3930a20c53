fn main() {
    if let Err(err) = restaurant_pipeline::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
