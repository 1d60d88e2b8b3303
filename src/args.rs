use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "newsreel", about = "Generate a Russian news briefing video")]
pub struct Args {
    /// Release date (YYYY-MM-DD), defaults to today in UTC
    #[clap(long)]
    pub date: Option<String>,

    /// RSS sources config
    #[clap(long, default_value = "configs/sources.yaml")]
    pub sources: String,

    /// Final mp4 path
    #[clap(long)]
    pub out: Option<String>,

    /// Skip narration and compositing
    #[clap(long)]
    pub dry_run: bool,

    /// Use the bundled sample news instead of live feeds
    #[clap(long)]
    pub use_sample: bool,

    /// Ask the avatar service for a watermarked test render
    #[clap(long)]
    pub heygen_test: bool,

    #[clap(long, default_value = "configs")]
    pub config_dir: String,

    #[clap(long, default_value = "data/sample_news.json")]
    pub sample_path: String,

    /// Print the avatar catalogue and exit
    #[clap(long)]
    pub list_avatars: bool,

    /// Print the voice catalogue and exit
    #[clap(long)]
    pub list_voices: bool,
}
