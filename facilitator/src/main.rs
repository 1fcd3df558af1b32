//! x402 facilitator server binary.

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pay402_facilitator::run::run().await
}
