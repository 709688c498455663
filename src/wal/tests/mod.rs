mod tests_recovery;

use tracing::Level;
use tracing_subscriber::fmt::Subscriber;

pub(crate) fn init_tracing() {
    let _ = Subscriber::builder()
        .with_max_level(Level::TRACE)
        .try_init();
}
