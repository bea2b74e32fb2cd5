#[tokio::main]
async fn main() {
    let code = storcomm::app::startup::startup().await;
    std::process::exit(code);
}
