//! Parallel stochastic training of the embedding matrices.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use aligned_box::AlignedBox;
use log::{debug, info};

use crate::config::{ModelType, TrainingConfig};
use crate::corpus::{SentenceSource, WordStream};
use crate::error::{Error, Result};
use crate::huffman;
use crate::model::Word2VecModel;
use crate::vocab::Vocab;
use crate::{real, Rng, EXP_TABLE_SIZE, MAX_EXP, MAX_SENTENCE_LENGTH, UNIGRAM_TABLE_SIZE};

/// Sigmoid-table cells per unit of `f`. The integer division is load-bearing:
/// the lookup grid has 83 cells per unit, not 83.33.
const EXP_SCALE: real = (EXP_TABLE_SIZE / 6 / 2) as real;

/// Coarse stages reported to a [`ProgressListener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AcquireVocab,
    FilterSortVocab,
    CreateHuffmanEncoding,
    TrainNeuralNetwork,
}

/// Callback invoked with a stage and a progress fraction in `[0, 1]`.
pub type ProgressListener = Box<dyn Fn(Stage, f64) + Send + Sync>;

/// Shared flag for cooperative cancellation. Workers check it only at
/// sentence and iteration boundaries, so the weight matrices stay
/// consistent (if partially trained) after a cancelled run.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// An `f32` cell shared between workers without locking. Lost updates are
/// accepted as numerical noise; taking a lock per cell would dominate the
/// run time.
#[derive(Default)]
#[repr(transparent)]
struct SharedReal {
    bits: AtomicU32,
}

impl SharedReal {
    fn get(&self) -> real {
        real::from_bits(self.bits.load(Ordering::Relaxed))
    }

    fn set(&self, value: real) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    fn add(&self, x: real) {
        self.set(self.get() + x);
    }
}

/// Trains a [`Word2VecModel`] from a sentence source.
pub struct Word2VecTrainer {
    config: TrainingConfig,
    listener: Option<ProgressListener>,
    cancel: Option<CancelToken>,
}

impl Word2VecTrainer {
    pub fn new(config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Word2VecTrainer {
            config,
            listener: None,
            cancel: None,
        })
    }

    pub fn with_listener(mut self, listener: ProgressListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Trains on `corpus`, learning the vocabulary from a first scan.
    pub fn train(&self, corpus: &dyn SentenceSource) -> Result<Word2VecModel> {
        self.stage(Stage::AcquireVocab, 0.0);
        let mut vocab = Vocab::new();
        vocab.learn_from_corpus(corpus)?;
        self.stage(Stage::AcquireVocab, 1.0);
        self.run(corpus, vocab)
    }

    /// Trains on `corpus` with an externally supplied word→count multiset
    /// in place of the vocabulary scan.
    pub fn train_with_vocab<I>(&self, corpus: &dyn SentenceSource, counts: I) -> Result<Word2VecModel>
    where
        I: IntoIterator<Item = (String, u64)>,
    {
        self.stage(Stage::AcquireVocab, 0.0);
        let vocab = Vocab::from_counts(counts);
        self.stage(Stage::AcquireVocab, 1.0);
        self.run(corpus, vocab)
    }

    fn run(&self, corpus: &dyn SentenceSource, mut vocab: Vocab) -> Result<Word2VecModel> {
        self.stage(Stage::FilterSortVocab, 0.0);
        vocab.finalize(self.config.min_frequency);
        self.stage(Stage::FilterSortVocab, 1.0);
        if vocab.len() < 2 {
            return Err(Error::invalid_config(
                "vocabulary is empty after filtering; lower min_frequency or provide more data",
            ));
        }
        info!(
            "training on {} words ({} distinct), {} dimensions",
            vocab.train_words,
            vocab.len(),
            self.config.layer_size
        );

        let mut run = TrainingRun::new(&self.config, vocab);
        self.stage(Stage::CreateHuffmanEncoding, 0.0);
        huffman::assign_codes(&mut run.vocab);
        self.stage(Stage::CreateHuffmanEncoding, 1.0);
        if self.config.negative_samples > 0 {
            run.init_unigram_table();
        }

        self.stage(Stage::TrainNeuralNetwork, 0.0);
        run.train(corpus, self.listener.as_ref(), self.cancel.as_ref())?;
        self.stage(Stage::TrainNeuralNetwork, 1.0);
        info!("training finished");
        Ok(run.into_model())
    }

    fn stage(&self, stage: Stage, progress: f64) {
        if let Some(listener) = &self.listener {
            listener(stage, progress);
        }
    }
}

/// Shared state for one training run: the finalized vocabulary, the weight
/// matrices, and the lookup tables. Shared read-write across workers.
struct TrainingRun<'a> {
    config: &'a TrainingConfig,
    vocab: Vocab,
    starting_alpha: real,
    workers: usize,
    syn0: AlignedBox<[SharedReal]>,
    syn1: AlignedBox<[SharedReal]>,
    syn1neg: AlignedBox<[SharedReal]>,
    exp_table: Vec<real>,
    unigram: Vec<u32>,
    word_count_actual: AtomicU64,
}

fn alloc_matrix(len: usize) -> AlignedBox<[SharedReal]> {
    // Zero-length allocations are not supported; unused matrices keep a
    // minimal placeholder.
    AlignedBox::slice_from_default(128, len.max(1)).expect("memory allocation failed")
}

impl<'a> TrainingRun<'a> {
    fn new(config: &'a TrainingConfig, vocab: Vocab) -> Self {
        let exp_table = (0..EXP_TABLE_SIZE)
            .map(|i| {
                // The grid point is single-precision but the exponential is
                // taken in double before narrowing.
                let x = (i as real / EXP_TABLE_SIZE as real * 2.0 - 1.0) * MAX_EXP;
                let e = (x as f64).exp() as real;
                e / (e + 1.0) // sigma(x) precomputed as x / (x + 1) of the exponential
            })
            .collect();

        let vocab_size = vocab.len();
        let layer = config.layer_size;
        let n = vocab_size * layer;

        let syn0 = alloc_matrix(n);
        let syn1 = alloc_matrix(if config.hierarchical_softmax { n } else { 0 });
        let syn1neg = alloc_matrix(if config.negative_samples > 0 { n } else { 0 });

        let mut rng = Rng(1);
        for cell in syn0.iter() {
            let r = rng.rand_u64();
            cell.set((((r & 0xFFFF) as real / 65536.0) - 0.5) / layer as real);
        }

        let workers = config
            .threads
            .min(thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1);

        TrainingRun {
            config,
            vocab,
            starting_alpha: config.starting_alpha(),
            workers,
            syn0,
            syn1,
            syn1neg,
            exp_table,
            unigram: Vec::new(),
            word_count_actual: AtomicU64::new(0),
        }
    }

    /// Fills the noise-word table with vocabulary indices in proportion to
    /// `count^0.75`.
    fn init_unigram_table(&mut self) {
        let power = 0.75f64;
        let vocab = &self.vocab;
        // The normalizer is accumulated through an integer, truncating
        // after every addition; the table contents depend on it.
        let mut train_words_pow: i64 = 0;
        for vw in vocab.iter() {
            train_words_pow = (train_words_pow as f64 + (vw.cn as f64).powf(power)) as i64;
        }

        let mut table = vec![0u32; UNIGRAM_TABLE_SIZE];
        let mut i = 0usize;
        let mut d1 = (vocab[i].cn as f64).powf(power) as real / train_words_pow as real;
        for (a, cell) in table.iter_mut().enumerate() {
            *cell = i as u32;
            if a as real / UNIGRAM_TABLE_SIZE as real > d1 {
                i += 1;
                if i < vocab.len() {
                    d1 += (vocab[i].cn as f64).powf(power) as real / train_words_pow as real;
                }
            }
            if i >= vocab.len() {
                i = vocab.len() - 1;
            }
        }
        self.unigram = table;
    }

    fn train(
        &self,
        corpus: &dyn SentenceSource,
        listener: Option<&ProgressListener>,
        cancel: Option<&CancelToken>,
    ) -> Result<()> {
        thread::scope(|s| {
            let handles = (0..self.workers)
                .map(|id| {
                    let this: &TrainingRun = self;
                    s.spawn(move || this.worker(id, corpus, listener, cancel))
                })
                .collect::<Vec<_>>();

            let mut first_err = None;
            for handle in handles {
                if let Err(err) = handle.join().unwrap() {
                    debug!("worker failed: {err}");
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
            match first_err {
                Some(err) => Err(err),
                None => Ok(()),
            }
        })
    }

    /// One worker's full training loop: `iterations` passes over the
    /// sentence stream, applying CBOW or skip-gram updates.
    fn worker(
        &self,
        id: usize,
        corpus: &dyn SentenceSource,
        listener: Option<&ProgressListener>,
        cancel: Option<&CancelToken>,
    ) -> Result<()> {
        let config = self.config;
        let layer = config.layer_size;
        let window = config.window;
        let negative = config.negative_samples as usize;
        let hs = config.hierarchical_softmax;
        let cbow = config.model == ModelType::Cbow;
        let sample = config.down_sample_rate;
        let vocab = &self.vocab;
        let vocab_size = vocab.len();
        let train_words = vocab.train_words;
        let budget = train_words / self.workers as u64;
        let denom = (config.iterations as u64 * train_words + 1) as real;

        let mut neu1: Vec<real> = vec![0.0; layer];
        let mut neu1e: Vec<real> = vec![0.0; layer];
        let mut sen: Vec<usize> = Vec::with_capacity(MAX_SENTENCE_LENGTH);
        let mut rng = Rng(id as u64);
        let mut alpha = self.starting_alpha;
        let mut local_iter = config.iterations;
        let mut word_count: u64 = 0;
        let mut last_word_count: u64 = 0;
        let mut sentence_position = 0usize;

        let mut words = WordStream::open(corpus)?.peekable();

        loop {
            if word_count - last_word_count > 10_000 {
                let n = word_count - last_word_count;
                let actual = self.word_count_actual.fetch_add(n, Ordering::Relaxed) + n;
                last_word_count = word_count;

                let progress = actual as real / denom;
                alpha = self.starting_alpha * (1.0 - progress);
                if alpha < self.starting_alpha * 0.0001 {
                    alpha = self.starting_alpha * 0.0001;
                }
                debug!(
                    "alpha {:.6}  progress {:.2}%",
                    alpha,
                    progress * 100.0
                );
                if let Some(listener) = listener {
                    listener(Stage::TrainNeuralNetwork, (progress as f64).min(1.0));
                }
            }

            if sen.is_empty() {
                if let Some(token) = cancel {
                    if token.is_cancelled() {
                        return Err(Error::Interrupted);
                    }
                }
                loop {
                    let word = match words.next() {
                        None => break,
                        Some(word) => word?,
                    };
                    let idx = match vocab.search(&word) {
                        None => continue,
                        Some(idx) => idx,
                    };
                    word_count += 1;
                    if idx == 0 {
                        break;
                    }
                    // Subsampling randomly discards frequent words while
                    // keeping the ranking the same.
                    if sample > 0.0 {
                        let f = vocab[idx].cn as real;
                        let k = sample * train_words as real;
                        // Square root in double, narrowed back before the
                        // single-precision arithmetic continues.
                        let ran = (((f / k) as f64).sqrt() as real + 1.0) * k / f;
                        if ran < rng.rand_real() {
                            continue;
                        }
                    }
                    sen.push(idx);
                    if sen.len() >= MAX_SENTENCE_LENGTH {
                        break;
                    }
                }
                sentence_position = 0;
            }

            if (words.peek().is_none() || word_count > budget) && sen.is_empty() {
                self.word_count_actual
                    .fetch_add(word_count - last_word_count, Ordering::Relaxed);
                local_iter -= 1;
                if local_iter == 0 {
                    break;
                }
                word_count = 0;
                last_word_count = 0;
                words = WordStream::open(corpus)?.peekable();
                continue;
            }

            if sen.is_empty() {
                // A fully subsampled or out-of-vocabulary sentence still
                // consumes one window draw.
                rng.rand_u64();
                continue;
            }

            let word = sen[sentence_position];
            neu1.fill(0.0);
            neu1e.fill(0.0);
            let b = (rng.rand_u64() % window as u64) as usize;

            if cbow {
                // in -> hidden: average the context vectors.
                let mut cw = 0u64;
                for a in b..(window * 2 + 1 - b) {
                    if a == window {
                        continue;
                    }
                    if sentence_position + a < window {
                        continue;
                    }
                    let c = sentence_position + a - window;
                    if c >= sen.len() {
                        continue;
                    }
                    let last_word = sen[c];
                    for l in 0..layer {
                        neu1[l] += self.syn0[l + last_word * layer].get();
                    }
                    cw += 1;
                }

                if cw > 0 {
                    for v in neu1.iter_mut() {
                        *v /= cw as real;
                    }

                    if hs {
                        let vw = &vocab[word];
                        for d in 0..vw.code.len() {
                            let l2 = vw.point[d] as usize * layer;
                            // Propagate hidden -> output.
                            let f: real =
                                (0..layer).map(|c| neu1[c] * self.syn1[c + l2].get()).sum();
                            if f <= -MAX_EXP || f >= MAX_EXP {
                                continue;
                            }
                            let f = self.exp_table[((f + MAX_EXP) * EXP_SCALE) as usize];
                            // 'g' is the gradient multiplied by the learning rate.
                            let g = ((1 - vw.code[d]) as real - f) * alpha;
                            // Propagate errors output -> hidden.
                            for c in 0..layer {
                                neu1e[c] += g * self.syn1[c + l2].get();
                            }
                            // Learn weights hidden -> output.
                            for c in 0..layer {
                                self.syn1[c + l2].add(g * neu1[c]);
                            }
                        }
                    }

                    if negative > 0 {
                        for d in 0..=negative {
                            let (target, label) = if d == 0 {
                                (word, 1.0)
                            } else {
                                match self.draw_noise_word(&mut rng, vocab_size, word) {
                                    None => continue,
                                    Some(target) => (target, 0.0),
                                }
                            };
                            let l2 = target * layer;
                            let f: real = (0..layer)
                                .map(|c| neu1[c] * self.syn1neg[c + l2].get())
                                .sum();
                            let g = if f > MAX_EXP {
                                (label - 1.0) * alpha
                            } else if f < -MAX_EXP {
                                label * alpha
                            } else {
                                (label - self.exp_table[((f + MAX_EXP) * EXP_SCALE) as usize])
                                    * alpha
                            };
                            for c in 0..layer {
                                neu1e[c] += g * self.syn1neg[c + l2].get();
                            }
                            for c in 0..layer {
                                self.syn1neg[c + l2].add(g * neu1[c]);
                            }
                        }
                    }

                    // hidden -> in
                    for a in b..(window * 2 + 1 - b) {
                        if a == window {
                            continue;
                        }
                        if sentence_position + a < window {
                            continue;
                        }
                        let c = sentence_position + a - window;
                        if c >= sen.len() {
                            continue;
                        }
                        let last_word = sen[c];
                        for l in 0..layer {
                            self.syn0[l + last_word * layer].add(neu1e[l]);
                        }
                    }
                }
            } else {
                // Skip-gram: each context word predicts the target.
                for a in b..(window * 2 + 1 - b) {
                    if a == window {
                        continue;
                    }
                    if sentence_position + a < window {
                        continue;
                    }
                    let c = sentence_position + a - window;
                    if c >= sen.len() {
                        continue;
                    }
                    let last_word = sen[c];
                    let l1 = last_word * layer;
                    neu1e.fill(0.0);

                    if hs {
                        let vw = &vocab[word];
                        for d in 0..vw.code.len() {
                            let l2 = vw.point[d] as usize * layer;
                            let f: real = (0..layer)
                                .map(|c| self.syn0[c + l1].get() * self.syn1[c + l2].get())
                                .sum();
                            if f <= -MAX_EXP || f >= MAX_EXP {
                                continue;
                            }
                            let f = self.exp_table[((f + MAX_EXP) * EXP_SCALE) as usize];
                            let g = ((1 - vw.code[d]) as real - f) * alpha;
                            for c in 0..layer {
                                neu1e[c] += g * self.syn1[c + l2].get();
                            }
                            for c in 0..layer {
                                self.syn1[c + l2].add(g * self.syn0[c + l1].get());
                            }
                        }
                    }

                    if negative > 0 {
                        for d in 0..=negative {
                            let (target, label) = if d == 0 {
                                (word, 1.0)
                            } else {
                                match self.draw_noise_word(&mut rng, vocab_size, word) {
                                    None => continue,
                                    Some(target) => (target, 0.0),
                                }
                            };
                            let l2 = target * layer;
                            let f: real = (0..layer)
                                .map(|c| self.syn0[c + l1].get() * self.syn1neg[c + l2].get())
                                .sum();
                            let g = if f > MAX_EXP {
                                (label - 1.0) * alpha
                            } else if f < -MAX_EXP {
                                label * alpha
                            } else {
                                (label - self.exp_table[((f + MAX_EXP) * EXP_SCALE) as usize])
                                    * alpha
                            };
                            for c in 0..layer {
                                neu1e[c] += g * self.syn1neg[c + l2].get();
                            }
                            for c in 0..layer {
                                self.syn1neg[c + l2].add(g * self.syn0[c + l1].get());
                            }
                        }
                    }

                    // Learn weights input -> hidden.
                    for c in 0..layer {
                        self.syn0[c + l1].add(neu1e[c]);
                    }
                }
            }

            sentence_position += 1;
            if sentence_position >= sen.len() {
                sen.clear();
            }
        }

        Ok(())
    }

    /// Draws one noise word from the unigram table. Returns `None` when the
    /// draw collides with the positive target and must be skipped.
    fn draw_noise_word(&self, rng: &mut Rng, vocab_size: usize, word: usize) -> Option<usize> {
        let r = rng.rand_u64();
        let mut target = self.unigram[((r >> 16) % UNIGRAM_TABLE_SIZE as u64) as usize] as usize;
        if target == 0 {
            // Sentinel cells re-map through a signed non-negative modulus
            // of the raw draw, not the shifted one.
            target = (r as i64).rem_euclid(vocab_size as i64) as usize;
        }
        if target == word {
            return None;
        }
        Some(target)
    }

    fn into_model(self) -> Word2VecModel {
        Word2VecModel {
            layer_size: self.config.layer_size,
            vocab: self.vocab.iter().map(|vw| vw.word.clone()).collect(),
            vectors: self.syn0.iter().map(SharedReal::get).collect(),
        }
    }
}
