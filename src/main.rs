fn main() {
    if let Err(err) = csfheat::cli::run() {
        csfheat::ui::eprintln_error(&err);
        std::process::exit(csfheat::exit::exit_code(&err));
    }
}
