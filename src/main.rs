//! Vagali Backend - binary entry point
//! Delegates to the library for all app logic.

#[tokio::main]
async fn main() {
    if let Err(e) = vagali_backend::run().await {
        eprintln!("vagali-backend failed to start: {}", e);
        std::process::exit(1);
    }
}
