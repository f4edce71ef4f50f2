#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Optional admin token seeded into the store the first time the gate
    /// runs. Lets a fresh deployment be managed without poking the DB by hand.
    pub bootstrap_admin_token: Option<String>,
    pub bootstrap_admin_desc: String,
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    Ok(Config {
        port: std::env::var("TACKLE_PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .unwrap_or(8080),
        database_url: std::env::var("TACKLE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://tackle.db?mode=rwc".into()),
        bootstrap_admin_token: std::env::var("TACKLE_BOOTSTRAP_ADMIN_TOKEN").ok(),
        bootstrap_admin_desc: std::env::var("TACKLE_BOOTSTRAP_ADMIN_DESC")
            .unwrap_or_else(|_| "Bootstrap admin token.".into()),
    })
}
