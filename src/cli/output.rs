use clap::ValueEnum;

/// How results and errors are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table and summary line for humans
    #[default]
    Human,
    /// Full sweep result as JSON
    Json,
}
