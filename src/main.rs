use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use word2vec::{real, ModelType, Stage, TextCorpus, TrainingConfig, Word2VecTrainer};

#[derive(Parser)]
#[command(about = "WORD VECTOR estimation toolkit", long_about = None)]
struct Options {
    /// Use text data from FILE to train the model; each line is a sentence
    #[arg(long = "train", value_name = "FILE")]
    train_file: PathBuf,

    /// Save the trained model to FILE
    #[arg(long = "output", value_name = "FILE")]
    output_file: PathBuf,

    /// Also export the word vectors in the textual format to FILE
    #[arg(long = "save-vectors", value_name = "FILE")]
    save_vectors_file: Option<PathBuf>,

    /// Export the vectors in binary mode rather than text
    #[arg(long)]
    binary: bool,

    /// Set size of word vectors; default is 100
    #[arg(long = "size", default_value_t = 100)]
    layer_size: usize,

    /// Set max skip length between words
    #[arg(long, default_value_t = 5)]
    window: usize,

    /// Set threshold for occurrence of words. Those that appear with higher
    /// frequency in the training data will be randomly down-sampled; default
    /// is 1e-3, useful range is (0, 1e-5)
    #[arg(long, default_value_t = 1e-3)]
    sample: real,

    /// Use Hierarchical Softmax
    #[arg(long)]
    hs: bool,

    /// Number of negative examples; common values are 3 - 10 (0 = not used)
    #[arg(long, default_value_t = 5)]
    negative: u32,

    /// Use N threads
    #[arg(long = "threads", value_name = "N", default_value_t = 12)]
    num_threads: usize,

    /// Run more training iterations
    #[arg(long, default_value_t = 5)]
    iter: u32,

    /// Discard words that appear less than N times
    #[arg(long = "min-count", value_name = "N", default_value_t = 5)]
    min_count: u64,

    /// Set the starting learning rate; default is 0.025 for skip-gram and 0.05 for CBOW
    #[arg(long)]
    alpha: Option<real>,

    /// Use the continuous bag of words model (otherwise, use skip-gram model)
    #[arg(long)]
    cbow: bool,
}

fn main() {
    env_logger::init();
    let options = Options::parse();
    if let Err(err) = run(options) {
        eprintln!("{err:#}");
        process::exit(1);
    }
}

fn run(options: Options) -> Result<()> {
    let config = TrainingConfig {
        model: if options.cbow {
            ModelType::Cbow
        } else {
            ModelType::SkipGram
        },
        min_frequency: options.min_count,
        threads: options.num_threads,
        window: options.window,
        hierarchical_softmax: options.hs,
        layer_size: options.layer_size,
        negative_samples: options.negative,
        down_sample_rate: options.sample,
        iterations: options.iter,
        learning_rate: options.alpha,
    };

    let bar = ProgressBar::new(10_000);
    bar.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] [{wide_bar:.cyan/.blue}] {percent}%")
            .expect("valid progress template"),
    );
    let training_bar = bar.clone();

    let trainer = Word2VecTrainer::new(config)
        .context("invalid training configuration")?
        .with_listener(Box::new(move |stage, progress| {
            if stage == Stage::TrainNeuralNetwork {
                training_bar.set_position((progress * 10_000.0) as u64);
            }
        }));

    let corpus = TextCorpus::new(&options.train_file);
    let model = trainer
        .train(&corpus)
        .with_context(|| format!("training on {:?} failed", options.train_file))?;
    bar.finish_and_clear();

    model
        .save(&options.output_file)
        .context("error writing model file")?;

    if let Some(path) = &options.save_vectors_file {
        let mut fo = BufWriter::new(File::create(path).context("error creating vectors file")?);
        if options.binary {
            model.write_binary_vectors(&mut fo)
        } else {
            model.write_text_vectors(&mut fo)
        }
        .context("error writing vectors file")?;
    }

    Ok(())
}
