use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;

use clap::Parser;

use word2vec::{normalize, real, Searcher, Word2VecModel};

/// number of closest words that will be shown
const N: usize = 40;

#[derive(Parser)]
#[command(about = "Interactive nearest-neighbor queries against a trained model")]
struct Options {
    /// A model produced by the trainer.
    #[arg(value_name = "FILE")]
    model_file: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let options = Options::parse();

    let model = Word2VecModel::load(&options.model_file)?;
    let searcher = Searcher::new(&model);

    'outer: loop {
        print!("Enter word or sentence (EXIT to break): ");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Err(err) => {
                eprintln!("error reading stdin: {err}");
                break;
            }
            Ok(0) => break,
            Ok(_) => {}
        }
        let line = line.trim();
        if line == "EXIT" {
            break;
        }

        let mut query: Vec<real> = vec![0.0; model.layer_size];
        let mut ignored = HashSet::new();
        for word in line.split(' ') {
            match searcher.raw_vector(word) {
                Err(_) => {
                    println!("Out of dictionary word: {word}");
                    continue 'outer;
                }
                Ok(v) => {
                    for (q, x) in query.iter_mut().zip(v) {
                        *q += x;
                    }
                    ignored.insert(word.to_string());
                }
            }
        }
        normalize(&mut query);

        println!();
        println!("                                              Word       Cosine distance");
        println!("------------------------------------------------------------------------");
        for (word, score) in searcher.top_matches_from_vector(&query, N, &ignored) {
            println!("{word:>50}\t\t{score:8.6}");
        }
    }

    Ok(())
}
