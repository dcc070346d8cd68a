//! Custom `daemon.log` line shape (spec §6 "Log format"):
//! `[<iso8601>] [PID:<n>] [<LEVEL>] <message>`.
//!
//! `tracing_subscriber::fmt`'s built-in formatters are all close but not
//! exact, so this crate supplies its own small `FormatEvent`
//! implementation rather than reaching for a format string option that
//! doesn't exist (SPEC_FULL.md §6).

use std::fmt;

use tracing::Subscriber;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

pub struct DaemonLogFormat;

impl<S, N> FormatEvent<S, N> for DaemonLogFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let pid = std::process::id();
        let level = event.metadata().level();

        write!(writer, "[{now}] [PID:{pid}] [{level}] ")?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
