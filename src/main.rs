use colored::Colorize;

fn main() -> anyhow::Result<()> {
    match quarterdeck::run() {
        Ok(()) => Ok(()),
        Err(err) => {
            if err.is_fatal() {
                eprintln!(
                    "{}",
                    "The period timeline is inconsistent and needs manual reconciliation."
                        .bright_red()
                        .bold()
                );
            }
            Err(err.into())
        }
    }
}
