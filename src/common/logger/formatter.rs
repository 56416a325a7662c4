use core::fmt as core_fmt;

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    fmt::{
        self, FmtContext,
        format::{FormatEvent, FormatFields},
    },
    registry::LookupSpan,
};

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

fn level_colour(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "\x1b[31m",
        Level::WARN => "\x1b[33m",
        Level::INFO => "\x1b[32m",
        Level::DEBUG => "\x1b[34m",
        Level::TRACE => "\x1b[35m",
    }
}

/// Single-line event format:
/// `[timestamp] LEVEL thread target:line > message`.
pub struct BridgeFormatter {
    use_ansi: bool,
}

impl BridgeFormatter {
    pub fn new(use_ansi: bool) -> Self {
        Self { use_ansi }
    }

    fn dim(&self) -> (&'static str, &'static str) {
        if self.use_ansi { (DIM, RESET) } else { ("", "") }
    }
}

impl<S, N> FormatEvent<S, N> for BridgeFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: fmt::format::Writer<'_>,
        event: &Event<'_>,
    ) -> core_fmt::Result {
        let (dim, reset) = self.dim();

        let format = time::macros::format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
        );
        let now =
            time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
        let timestamp = now.format(&format).unwrap_or_else(|_| "-".to_string());
        write!(writer, "{dim}[{timestamp}]{reset} ")?;

        let metadata = event.metadata();
        let level = format!("{: <5}", metadata.level().to_string());
        if self.use_ansi {
            write!(writer, "{}{BOLD}{level}{RESET} ", level_colour(metadata.level()))?;
        } else {
            write!(writer, "{level} ")?;
        }

        let thread = std::thread::current();
        match thread.name() {
            Some(name) => write!(writer, "{name} ")?,
            None => write!(writer, "{:?} ", thread.id())?,
        }

        let line = metadata.line().map_or_else(|| "??".to_string(), |l| l.to_string());
        write!(writer, "{dim}{}:{line}{reset} > ", metadata.target())?;

        ctx.format_fields(writer.by_ref(), event)?;
        write!(writer, "{reset}")?;
        writeln!(writer)
    }
}
