//! Binary entry point for the Skirmish game server.

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    skirmish::init().await
}
