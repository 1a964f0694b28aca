//! Seedable control-parameter draws

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::LogNormal;

use ragprobe_core::{ControlParams, Error, Result, Vocabularies, Vocabulary};

/// Log-normal parameters of the target question length (words)
const LENGTH_MU: f64 = 2.4;
const LENGTH_SIGMA: f64 = 0.42;
const MIN_QUESTION_LENGTH: usize = 4;

struct Choice {
    options: Vec<String>,
    weights: Option<WeightedIndex<f64>>,
}

impl Choice {
    fn new(vocabulary: &Vocabulary) -> Result<Self> {
        let weights = vocabulary
            .weights()
            .map(|w| WeightedIndex::new(w.iter().copied()))
            .transpose()
            .map_err(|e| Error::Configuration(format!("invalid weights: {}", e)))?;
        Ok(Self {
            options: vocabulary.options().to_vec(),
            weights,
        })
    }

    fn draw(&self, rng: &mut StdRng) -> String {
        let index = match &self.weights {
            Some(dist) => dist.sample(rng),
            None => rng.gen_range(0..self.options.len()),
        };
        self.options[index].clone()
    }
}

/// Draws `ControlParams` from the configured vocabularies.
///
/// With a seed, the sequence of draws is reproducible across runs.
pub struct ParameterSampler {
    rng: StdRng,
    domains: Choice,
    tones: Choice,
    difficulties: Choice,
    topics: Choice,
    languages: Choice,
    length: LogNormal<f64>,
    grounded_ratio: f64,
}

impl ParameterSampler {
    pub fn new(vocabularies: &Vocabularies, grounded_ratio: f64, seed: Option<u64>) -> Result<Self> {
        if !(0.0..=1.0).contains(&grounded_ratio) {
            return Err(Error::Configuration(format!(
                "grounded_ratio must be within [0, 1], got {}",
                grounded_ratio
            )));
        }

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            rng,
            domains: Choice::new(&vocabularies.domains)?,
            tones: Choice::new(&vocabularies.tones)?,
            difficulties: Choice::new(&vocabularies.difficulties)?,
            topics: Choice::new(&vocabularies.topics)?,
            languages: Choice::new(&vocabularies.languages)?,
            length: LogNormal::new(LENGTH_MU, LENGTH_SIGMA)
                .map_err(|e| Error::Configuration(format!("invalid question length distribution: {}", e)))?,
            grounded_ratio,
        })
    }

    pub fn draw(&mut self) -> ControlParams {
        let domain = self.domains.draw(&mut self.rng);
        let tone = self.tones.draw(&mut self.rng);
        let difficulty = self.difficulties.draw(&mut self.rng);
        let question_length = self.question_length();
        let topic = self.topics.draw(&mut self.rng);
        let language = self.languages.draw(&mut self.rng);
        let is_grounded = self.rng.gen_bool(self.grounded_ratio);

        ControlParams {
            difficulty,
            tone,
            language,
            domain,
            topic,
            question_length,
            is_grounded,
        }
    }

    /// `max(4, round(exp(N(2.4, 0.42))))`
    fn question_length(&mut self) -> usize {
        let length = self.length.sample(&mut self.rng).round() as usize;
        length.max(MIN_QUESTION_LENGTH)
    }
}
