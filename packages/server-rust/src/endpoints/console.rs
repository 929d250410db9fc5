//! Terminal step that dumps each message to a writer.

use std::fmt::Display;
use std::io::{self, Write};

use async_trait::async_trait;
use courier_core::{Exchange, Step};
use parking_lot::Mutex;

/// Writes the message id, its metadata and its content.
pub struct ConsoleStep<W = io::Stdout> {
    writer: Mutex<W>,
}

impl ConsoleStep<io::Stdout> {
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl Default for ConsoleStep<io::Stdout> {
    fn default() -> Self {
        Self::stdout()
    }
}

impl<W: Write + Send + 'static> ConsoleStep<W> {
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<T, W> Step<T> for ConsoleStep<W>
where
    T: Display + Send + 'static,
    W: Write + Send + 'static,
{
    fn name(&self) -> &str {
        "console"
    }

    async fn execute(&self, exchange: &mut Exchange<T>) -> anyhow::Result<()> {
        let message = exchange.message();
        let mut out = self.writer.lock();
        writeln!(out, "id:{}", message.id())?;
        writeln!(out, "metadata:")?;
        for annotation in message.metadata() {
            writeln!(out, "  {annotation:?}")?;
        }
        writeln!(out, "content:{}", message.content())?;
        out.flush()?;
        Ok(())
    }
}
