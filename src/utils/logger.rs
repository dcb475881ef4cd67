use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;

pub fn init_logger() {
    // Установка базового фильтра и переопределение через переменные окружения
    let env = Env::default().filter_or("RUST_LOG", "warn,audionova=info");

    let mut builder = Builder::from_env(env);

    // Явно подавляем логи от определенных модулей
    builder
        .filter_module("mio", LevelFilter::Error)
        .filter_module("hyper", LevelFilter::Error)
        .filter_module("tokio_util", LevelFilter::Error)
        .filter_module("rustls", LevelFilter::Warn)
        // Включаем логирование HTTP-клиента
        .filter_module("reqwest", LevelFilter::Warn)
        // Детальное логирование цепочки синтеза
        .filter_module("audionova::services::tts", LevelFilter::Debug)
        .filter_module("audionova::services::synthesis", LevelFilter::Debug)
        // Форматирование логов
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .init();
}
