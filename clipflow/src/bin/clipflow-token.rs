use anyhow::Context;
use clipflow::api::jwt::JwtService;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_help();
        return Ok(());
    }

    dotenvy::dotenv().ok();
    let service = JwtService::from_env().context("JWT_SECRET must be set")?;

    let subject = args
        .iter()
        .skip(1)
        .find(|a| !a.starts_with("--"))
        .map(String::as_str)
        .unwrap_or("operator");
    let json = args.iter().any(|a| a == "--json");

    let token = service
        .issue_admin_token(subject)
        .context("failed to sign token")?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "token": token,
                "subject": subject,
                "expires_in": service.token_ttl_secs(),
            })
        );
    } else {
        println!("{}", token);
    }

    Ok(())
}

fn print_help() {
    println!("clipflow-token - Mint an admin bearer token for the clipflow API");
    println!();
    println!("Usage:");
    println!("  clipflow-token [SUBJECT]          # prints the token");
    println!("  clipflow-token [SUBJECT] --json   # prints JSON");
    println!();
    println!("Reads JWT_SECRET, JWT_ISSUER, JWT_AUDIENCE and JWT_EXPIRATION_SECS");
    println!("from the environment or a .env file.");
}
