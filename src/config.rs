use anyhow::bail;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

const MIN_SECRET_BYTES: usize = 32;

/// Start-up configuration. Flags fall back to environment variables so the
/// token secret and the admin password never need to appear on a command line.
#[derive(Debug, Clone, Parser)]
#[command(name = "exchanged", version, about = "Exchange student record sidecar")]
pub struct Config {
    /// Workspace directory to open at start (can also be chosen later with `workspace.select`).
    #[arg(long, env = "EXCHANGED_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// HMAC secret used to sign identity tokens.
    #[arg(long, env = "EXCHANGED_TOKEN_SECRET", hide_env_values = true)]
    pub token_secret: String,

    /// Lifetime of an issued identity token, in seconds.
    #[arg(long, env = "EXCHANGED_TOKEN_TTL_SECS", default_value_t = 86_400)]
    pub token_ttl_secs: u64,

    /// Password for the seeded `admin` account.
    #[arg(long, env = "EXCHANGED_ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: String,

    /// Display name for the seeded `admin` account.
    #[arg(long, env = "EXCHANGED_ADMIN_NAME", default_value = "System Administrator")]
    pub admin_name: String,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.token_secret.len() < MIN_SECRET_BYTES {
            bail!("token secret must be at least {MIN_SECRET_BYTES} bytes");
        }
        if self.token_ttl_secs == 0 {
            bail!("token ttl must be positive");
        }
        if self.admin_password.trim().is_empty() {
            bail!("admin password must not be empty");
        }
        if self.admin_name.trim().is_empty() {
            bail!("admin name must not be empty");
        }
        Ok(())
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["exchanged"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).expect("parse args")
    }

    #[test]
    fn defaults_apply() {
        let cfg = parse(&[
            "--token-secret",
            "0123456789abcdef0123456789abcdef",
            "--admin-password",
            "pw",
        ]);
        assert_eq!(cfg.token_ttl(), Duration::from_secs(86_400));
        assert_eq!(cfg.admin_name, "System Administrator");
        assert!(cfg.workspace.is_none());
        cfg.validate().expect("valid");
    }

    #[test]
    fn short_secret_is_rejected() {
        let cfg = parse(&["--token-secret", "short", "--admin-password", "pw"]);
        assert!(cfg.validate().is_err());
    }
}
