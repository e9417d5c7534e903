#[tokio::main]
async fn main() {
    if let Err(e) = pyspace_cli::run().await {
        eprintln!("{}", pyspace_cli::format_error(&format!("{:#}", e)));
        std::process::exit(1);
    }
}
