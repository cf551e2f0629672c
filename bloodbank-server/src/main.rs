//! 血库服务器主程序

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bloodbank_admin::{init_logging, BloodBankConfig, CliOverrides, ConfigManager, LogFormat};
use bloodbank_assistant::Assistant;
use bloodbank_database::{BloodBankStore, DatabasePool, MemoryStore};
use bloodbank_integration::{backends_from_settings, AiSettings, NotificationHub};
use bloodbank_web::{AppState, AuthSettings, WebServer, WebSettings};
use clap::Parser;
use tracing::{error, info, warn};

/// 血库服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "bloodbank-server")]
#[command(about = "血库库存管理服务器")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 监听主机
    #[arg(long)]
    host: Option<String>,

    /// 服务器端口
    #[arg(short, long)]
    port: Option<u16>,

    /// PostgreSQL 连接串
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// 日志级别
    #[arg(short, long)]
    log_level: Option<String>,

    /// 输出生效配置后退出
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut manager = ConfigManager::load(args.config.as_deref())?;
    manager.apply_overrides(CliOverrides {
        host: args.host,
        port: args.port,
        database_url: args.database_url,
        log_level: args.log_level,
    });

    if args.print_config {
        println!("{}", manager.to_toml()?);
        return Ok(());
    }

    let config = manager.config().clone();
    let format: LogFormat = config.logging.format.parse()?;
    init_logging(&config.logging.level, format)?;
    manager.validate()?;

    info!("启动血库服务器...");
    info!("血库服务器配置:");
    info!("  名称: {}", config.server.name);
    info!("  监听地址: {}:{}", config.server.host, config.server.port);
    info!("  低库存阈值: {}", config.inventory.low_stock_threshold);

    let store = open_store(&config).await?;
    let assistant = build_assistant(&config)?;
    info!("  聊天助手: {}", assistant.provider_name());

    let auth_settings = AuthSettings {
        jwt_secret: config.auth.jwt_secret.clone(),
        token_ttl_hours: config.auth.token_ttl_hours,
        otp_ttl_minutes: config.auth.otp_ttl_minutes,
        otp_max_attempts: config.auth.otp_max_attempts,
        require_email_verification: config.auth.require_email_verification,
    };
    let web_settings = WebSettings {
        low_stock_threshold: config.inventory.low_stock_threshold,
        expiring_days: config.inventory.expiring_days,
        analytics_days: config.inventory.analytics_days,
        enable_cors: config.web.enable_cors,
        cors_allowed_origins: config.web.cors_allowed_origins.clone(),
    };

    let state = AppState::new(store, &auth_settings)
        .with_settings(web_settings)
        .with_assistant(assistant)
        .with_hub(Arc::new(NotificationHub::new(config.web.notification_capacity)));

    spawn_expiry_sweeper(state.clone(), config.inventory.expiry_sweep_interval_secs);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, config.server.port))?;

    if let Err(e) = WebServer::new(addr, state).run().await {
        error!("服务器启动失败: {}", e);
        return Err(e.into());
    }

    Ok(())
}

/// 配置了数据库时连接 PostgreSQL，否则使用内存存储
async fn open_store(config: &BloodBankConfig) -> Result<Arc<dyn BloodBankStore>> {
    let Some(url) = config.database.url.as_deref().filter(|u| !u.trim().is_empty()) else {
        warn!("未配置数据库，使用内存存储（重启后数据丢失）");
        return Ok(Arc::new(MemoryStore::new()));
    };

    let pool = DatabasePool::connect(
        url,
        config.database.max_connections,
        config.database.acquire_timeout_secs,
    )
    .await
    .context("Failed to connect to database")?;

    if config.database.run_migrations {
        pool.migrate().await.context("Failed to run database migrations")?;
        info!("数据库表结构已就绪");
    }

    Ok(Arc::new(pool))
}

fn build_assistant(config: &BloodBankConfig) -> Result<Assistant> {
    let settings = AiSettings {
        gemini_api_key: config.assistant.gemini_api_key.clone(),
        gemini_model: config.assistant.gemini_model.clone(),
        azure_endpoint: config.assistant.azure_endpoint.clone(),
        azure_api_key: config.assistant.azure_api_key.clone(),
        azure_deployment: config.assistant.azure_deployment.clone(),
        azure_api_version: config.assistant.azure_api_version.clone(),
        timeout_secs: config.assistant.timeout_secs,
    };
    let backends = backends_from_settings(&settings)?;
    Ok(Assistant::new(backends))
}

/// 周期性把过期的在库单位标记为 expired，并清理过期会话
fn spawn_expiry_sweeper(state: AppState, interval_secs: u64) {
    if interval_secs == 0 {
        warn!("过期扫描已禁用");
        return;
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;

            match state.store.mark_expired_donations(state.today()).await {
                Ok(0) => {}
                Ok(count) => {
                    state.hub.bump();
                    info!("过期扫描: {} 个血液单位已标记为过期", count);
                }
                Err(e) => warn!("过期扫描失败: {}", e),
            }

            let purged = state.auth.sessions().purge_expired().await;
            if purged > 0 {
                info!("清理了 {} 个过期会话", purged);
            }
        }
    });
}
