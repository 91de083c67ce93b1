use std::io::Write;
use std::path::PathBuf;

use clap::Parser;

use word2vec::{Searcher, Word2VecModel};

/// number of closest words that will be shown
const N: usize = 40;

#[derive(Parser)]
#[command(about = "Interactive analogy queries: a is to b as c is to ...")]
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

    let mut line = String::new();
    loop {
        print!("Enter three words (EXIT to break): ");
        let _ = std::io::stdout().flush();

        line.clear();
        match std::io::stdin().read_line(&mut line) {
            Err(err) => {
                eprintln!("error reading stdin: {err}");
                break;
            }
            Ok(0) => break,
            Ok(_) => {}
        }
        if line.trim() == "EXIT" {
            break;
        }

        let words: Vec<&str> = line.trim().split(' ').collect();
        if words.len() != 3 {
            println!(
                "{} words were entered.. three words are needed at the input to perform the calculation",
                words.len()
            );
            continue;
        }

        let matches = searcher
            .analogy(words[0], words[1])
            .and_then(|analogy| analogy.top(words[2], N));
        match matches {
            Err(err) => {
                println!("{err}");
                continue;
            }
            Ok(matches) => {
                println!();
                println!("                                              Word       Cosine distance");
                println!("------------------------------------------------------------------------");
                for (word, score) in matches {
                    println!("{word:>50}\t\t{score:8.6}");
                }
            }
        }
    }

    Ok(())
}
