use tokenizer_visualizer::cli;

fn main() {
    // Every error message already carries its cause.
    if let Err(e) = cli::run_cli() {
        eprintln!("Application error: {}", e);
        std::process::exit(1);
    }
}
