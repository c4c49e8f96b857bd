use std::io::Write;

/// 初始化全局 logger
///
/// 默认过滤级别为 `Info`，可以通过 `RUST_LOG` 环境变量覆盖，
/// 例如 `RUST_LOG=nova_render_graph=trace`。
pub fn init_log() {
    init_log_with_level(log::LevelFilter::Info);
}

pub fn init_log_with_level(default_level: log::LevelFilter) {
    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            let info_style = buf
                .default_level_style(log::Level::Info)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green)));
            let level_style = match record.level() {
                log::Level::Info => info_style,
                log::Level::Warn => buf
                    .default_level_style(log::Level::Warn)
                    .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
                log::Level::Error => buf
                    .default_level_style(log::Level::Error)
                    .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
                log::Level::Trace => buf
                    .default_level_style(log::Level::Trace)
                    .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Magenta))),
                _ => buf.default_level_style(record.level()),
            };
            let grey_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));
            let target_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(90, 120, 160))));

            let line = record.line().unwrap_or(!0);
            // windows 下路径分隔符为 `\`
            let file = record.file().unwrap_or("").rsplit(['/', '\\']).next().unwrap_or("");
            let time = chrono::Local::now().format("%H:%M:%S%.3f");
            let level = record.level();
            let target = record.target().split("::").next().unwrap_or("");

            writeln!(
                buf,
                "{level_style}[{time}] {level:<5}{level_style:#} {target_style}{target}{target_style:#} \
                 {grey_style}[{file}:{line}]{grey_style:#} {}",
                record.args()
            )
        })
        .filter(None, default_level);

    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    // 多次初始化（例如多个 bin 共用入口）时保持第一次的配置
    if builder.try_init().is_err() {
        log::debug!("logger already initialized");
    }
}
