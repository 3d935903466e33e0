use resilient_http::{ClientConfig, RequestOptions, ResilientClient};
use serde_json::Value;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let users = ResilientClient::new(
        ClientConfig::from_env("USERS_API")?.with_header("Accept", "application/json"),
    );
    let billing = ResilientClient::new(ClientConfig::from_env("BILLING_API")?);
    let token = std::env::var("API_TOKEN").ok();

    let mut options = RequestOptions::new().query("limit", 10);
    if let Some(token) = &token {
        options = options.auth_token(token);
    }

    let (accounts, invoices) = tokio::join!(
        users.get::<Value>("/accounts", options.clone()),
        billing.get::<Value>("invoices", options),
    );

    println!("accounts: {:?}", accounts?.data);
    println!("invoices: {:?}", invoices?.data);

    Ok(())
}
