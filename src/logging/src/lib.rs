use log::info;

/// Initialize the global logger from `RUST_LOG`, defaulting to `info`.
///
/// When `FANIN_LOG_SCOPE` is set (the launcher sets it per spawned process),
/// every line carries that tag, so controller and worker logs stay
/// distinguishable after being multiplexed into one place.
pub fn init_log() {
    use chrono::Utc;
    use std::io::Write;

    let scope = std::env::var("FANIN_LOG_SCOPE").unwrap_or_default();

    let env = env_logger::Env::default().default_filter_or("info");
    let result = env_logger::Builder::from_env(env)
        .format(move |buf, record| {
            let level_style = buf.default_level_style(record.level());
            let tag = if scope.is_empty() {
                String::new()
            } else {
                format!("{} ", scope)
            };
            writeln!(
                buf,
                "[{} {} {}{}:{}] {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S%.6f"),
                level_style.value(record.level()),
                tag,
                record.file().unwrap_or("<unnamed>"),
                record.line().unwrap_or(0),
                &record.args()
            )
        })
        .try_init();

    // tests may race to initialize; first caller wins, the rest are no-ops
    if result.is_ok() {
        info!("env_logger initialized");
    }
}
