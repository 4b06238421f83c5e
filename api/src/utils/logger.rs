use promptline::Config;
use sentry::{types::Dsn, SessionMode};
use std::{borrow::Cow, str::FromStr};
use tracing::warn;
use tracing_subscriber::{
    prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Installs the tracing subscriber. Events are forwarded to Sentry when `SENTRY_DSN` is set.
pub fn setup(config: &Config) -> sentry::ClientInitGuard {
    let (dsn, invalid_dsn) = match config.sentry_dsn.as_deref().map(Dsn::from_str).transpose() {
        Ok(dsn) => (dsn, None),
        Err(err) => (None, Some(err)),
    };

    let guard = sentry::init(sentry::ClientOptions {
        traces_sample_rate: 1.0,
        attach_stacktrace: true,
        session_mode: SessionMode::Request,
        release: Some(Cow::Borrowed(env!("STATIC_BUILD_DATE"))),
        dsn,
        ..sentry::ClientOptions::default()
    });

    tracing_subscriber::registry()
        .with(sentry_tracing::layer())
        .with(
            tracing_subscriber::fmt::layer().with_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "api=info,promptline=info,tower_http=info".into()),
            ),
        )
        .init();

    if let Some(err) = invalid_dsn {
        warn!("Ignoring invalid SENTRY_DSN: {err}");
    }

    guard
}
