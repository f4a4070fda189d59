fn main() {
    std::process::exit(cli::Cli::run());
}
