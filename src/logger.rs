use crate::config::{DEFAULT_LOG_FILTER, LOG_ENV, LOG_TIME_FORMAT};
use crate::peer::types::IceCandidate;
use tracing::debug;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Логирование с временными метками.
/// Повторный вызов ничего не делает, поэтому встраивающее приложение может
/// поставить свой subscriber раньше нас.
pub fn init_logging() -> bool {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_timer(ChronoLocal::new(LOG_TIME_FORMAT.to_string())),
        )
        .try_init()
        .is_ok()
}

/// Печать ICE-candidate при появлении (Trickle-ICE)
pub fn dump_candidate(label: &str, peer: &str, cand: &IceCandidate) {
    debug!(
        event = "trickle_candidate",
        label,
        peer,
        candidate = %cand.candidate,
        sdp_mid = ?cand.sdp_mid,
        sdp_mline_index = ?cand.sdp_mline_index,
        "Trickle candidate"
    );
}
