fn main() -> std::process::ExitCode {
    billbot_cli::run()
}
