//! # Copilot Gateway 主程序

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use copilot_gateway::{
    AppContext, Result,
    auth::GithubDeviceFlow,
    config::ConfigManager,
    database,
    error::Context,
    lerror, linfo,
    logging::{self, LogComponent, LogStage},
    proxy::{self, ProxyState},
};

#[derive(Parser)]
#[command(
    name = "copilot-gateway",
    about = "OpenAI-compatible gateway for GitHub Copilot",
    version = env!("CARGO_PKG_VERSION"),
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// 配置文件路径
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, env = "COPILOT_GATEWAY_LOG", default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Start the gateway (default if no command specified)")]
    Serve {
        #[arg(short, long, help = "Override the configured listen port")]
        port: Option<u16>,
    },

    #[command(about = "Obtain a long-term GitHub credential via device login")]
    Login {
        #[arg(long, help = "Exchange and store the credential after login")]
        register: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_optimized_logging(Some(&cli.log_level));

    let result = match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => run_server(cli.config, port).await,
        Commands::Login { register } => run_login(cli.config, register).await,
    };

    if let Err(e) = &result {
        lerror!(
            "system",
            LogStage::Shutdown,
            LogComponent::Main,
            "fatal",
            &format!("程序异常退出: {e:?}")
        );
    }
    result
}

async fn build_context(config_path: Option<PathBuf>, port: Option<u16>) -> Result<AppContext> {
    let manager = ConfigManager::load(config_path.as_deref())?;
    let mut config = manager.into_config();
    if let Some(port) = port {
        config.server.port = port;
    }

    let db = database::init_database_with_config(&config.database)
        .await
        .context("数据库连接失败")?;
    database::run_migrations(&db)
        .await
        .context("数据库迁移失败")?;

    AppContext::build(config, db)
}

async fn run_server(config_path: Option<PathBuf>, port: Option<u16>) -> Result<()> {
    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Main,
        "service_starting",
        "服务启动"
    );

    let context = build_context(config_path, port).await?;
    let stored = context.broker.store().count().await?;
    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Main,
        "credentials_loaded",
        &format!("已存储 {stored} 个长期凭证"),
        models = context.catalog.len()
    );

    let listener = proxy::bind_listener(&context.config.server).await?;
    proxy::serve(listener, ProxyState::new(Arc::new(context))).await
}

async fn run_login(config_path: Option<PathBuf>, register: bool) -> Result<()> {
    let flow = GithubDeviceFlow::new()?;
    let code = flow.request_device_code().await?;

    println!(
        "Open {} and enter the code: {}",
        code.verification_uri, code.user_code
    );

    let token = flow.poll_access_token(&code).await?;
    println!("GitHub token: {token}");

    if register {
        let context = build_context(config_path, None).await?;
        context
            .broker
            .resolve("login", Some(&format!("Bearer {token}")))
            .await?;
        linfo!(
            "system",
            LogStage::Authentication,
            LogComponent::DeviceFlow,
            "credential_registered",
            "长期凭证已登记"
        );
    }
    Ok(())
}
