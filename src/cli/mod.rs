use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat session
    Chat,

    /// Send a single message and print the reply
    Ask {
        prompt: String,

        /// Files to attach (images or documents)
        #[arg(short, long)]
        attach: Vec<String>,
    },

    /// List the models available in the selected region
    Models,

    /// List the knowledge bases available for retrieval
    Kbs,
}
