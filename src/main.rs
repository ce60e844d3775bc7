// bunqflow 命令行：生成密钥、预热会话

use anyhow::{bail, Context, Result};
use bunqflow_core::config::{default_config_path, load_config};
use bunqflow_core::logger::init_tracing;
use bunqflow_core::signer::{generate_key_pair, validate_key_pair, DEFAULT_KEY_BITS};
use bunqflow_lib::build_session_manager;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bunqflow")]
#[command(about = "bunq API session and request tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 配置文件路径
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// 生成 RSA 密钥对（PEM）
    Keygen {
        #[arg(long, default_value_t = DEFAULT_KEY_BITS)]
        bits: u32,
    },

    /// 为配置中的凭证建立会话并输出会话描述
    Session {
        /// 清空缓存并重新握手
        #[arg(long)]
        force: bool,

        /// 只处理指定凭证
        #[arg(long)]
        credential: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("加载配置失败: {}", config_path.display()))?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Keygen { bits } => {
            let keys = generate_key_pair(bits)?;
            println!("{}", keys.private_key_pem.trim_end());
            println!("{}", keys.public_key_pem.trim_end());
        }
        Commands::Session { force, credential } => {
            let credentials = config
                .credentials
                .iter()
                .map(|c| c.resolve())
                .collect::<Result<Vec<_>, _>>()?;
            let selected: Vec<_> = credentials
                .into_iter()
                .filter(|c| credential.as_deref().map_or(true, |id| c.identity() == id))
                .collect();
            if selected.is_empty() {
                bail!("没有可用的凭证，请检查 {}", config_path.display());
            }

            let sessions = build_session_manager(&config)?;
            for credential in &selected {
                validate_key_pair(credential.private_key_pem(), credential.public_key_pem())
                    .with_context(|| format!("凭证 {} 的密钥无效", credential.identity()))?;
                let descriptor = sessions
                    .ensure_session(credential, force)
                    .await
                    .with_context(|| format!("凭证 {} 建立会话失败", credential.identity()))?;
                let output = serde_json::json!({
                    "credential": credential.identity(),
                    "userId": descriptor.user_id,
                    "environment": descriptor.environment,
                    "sessionTimeoutSeconds": descriptor.session_timeout_secs,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
        }
    }
    Ok(())
}
