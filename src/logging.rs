use std::io::Write;

use log::LevelFilter;

/// Initializes the global logger.
///
/// Default level is `warn` so routine passes stay silent; `--debug` drops the
/// threshold to `debug`, which also surfaces rate-limiting waits and
/// (optionally) SQL queries. `RUST_LOG` overrides both.
///
/// Safe to call more than once; only the first call takes effect.
pub fn init(debug: bool) {
    let default_level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };

    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(default_level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(buf, "{}: {}", record.level().to_string().to_lowercase(), record.args())
        });

    // Ignore the error from double initialization (tests call this per case).
    let _ = builder.try_init();
}
