use std::fs;
use std::path::Path;

use tracing::info;

use crate::error::BridgeResult;

/// Textual rewrite of the node's `app.toml`: sets minimum gas prices and
/// switches on the REST API, gRPC and swagger so the monitor has something
/// to poll.
pub fn rewrite_app_toml(content: &str, minimum_gas_prices: &str) -> String {
    content
        .replace(
            r#"minimum-gas-prices = """#,
            &format!(r#"minimum-gas-prices = "{minimum_gas_prices}""#),
        )
        .replace("enable = false", "enable = true")
        .replace("swagger = false", "swagger = true")
}

pub fn update_app_toml(path: &Path, minimum_gas_prices: &str) -> BridgeResult<()> {
    let content = fs::read_to_string(path)?;
    fs::write(path, rewrite_app_toml(&content, minimum_gas_prices))?;
    info!(path = %path.display(), minimum_gas_prices, "app.toml updated");
    Ok(())
}
