use tracing_subscriber::EnvFilter;

/// Library crates whose logs show up in test output.
const CRATE_NAMES: &[&str] = &["keybench", "keybench_core"];

/// Sends logs of the keybench crates to the test output.
///
/// Logs from `keybench` and `keybench_core` are captured at every level, other crates only
/// report errors. Output goes through the test writer, so it is shown for failing tests only.
/// Calling this more than once, for example from every test in a module, is fine.
///
/// # Example
///
/// ```
/// keybench_test::tracing::init();
/// ```
pub fn init() {
    let directives = CRATE_NAMES
        .iter()
        .map(|name| format!("{name}=trace"))
        .collect::<Vec<_>>()
        .join(",");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!("error,{directives}")))
        .with_test_writer()
        .compact()
        .try_init()
        .ok();
}
