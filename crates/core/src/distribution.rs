//! Action distributions: normalized mappings from actions to selection probability.

use rand::{Rng, RngCore};

use crate::error::MdpError;
use crate::PROB_TOLERANCE;

/// An action paired with the probability of it being selected.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionProb<A> {
    /// The action.
    pub action: A,
    /// Probability of selecting the action.
    pub probability: f64,
}

impl<A> ActionProb<A> {
    /// Pair an action with its selection probability.
    pub fn new(action: A, probability: f64) -> Self {
        Self {
            action,
            probability,
        }
    }
}

/// A probability distribution over actions for one state.
///
/// Invariants:
/// - All probabilities are non-negative
/// - Probabilities sum to 1 (within [`PROB_TOLERANCE`])
/// - There is at least one entry
///
/// Entries keep the order they were given in; sampling walks them in that
/// order. Zero-probability entries may be present or omitted.
///
/// # Example
///
/// ```rust
/// use semimdp_core::ActionDistribution;
///
/// let d = ActionDistribution::new(vec![("left", 0.25), ("right", 0.75)]).unwrap();
/// assert_eq!(d.probability_of(&"right"), 0.75);
/// assert_eq!(d.probability_of(&"up"), 0.0);
///
/// // Ties can be spread evenly
/// let u = ActionDistribution::uniform(vec!["a", "b", "c", "d"]).unwrap();
/// assert!((u.probability_of(&"c") - 0.25).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDistribution<A> {
    entries: Vec<ActionProb<A>>,
}

impl<A> ActionDistribution<A> {
    /// Create a distribution from (action, probability) pairs.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - There are no entries
    /// - Any probability is negative
    /// - The probabilities don't sum to 1 (within tolerance)
    pub fn new(entries: Vec<(A, f64)>) -> Result<Self, MdpError> {
        if entries.is_empty() {
            return Err(MdpError::EmptyDistribution);
        }

        if let Some(&(_, probability)) = entries.iter().find(|(_, p)| *p < -PROB_TOLERANCE) {
            return Err(MdpError::NegativeProbability { probability });
        }

        let sum: f64 = entries.iter().map(|(_, p)| p).sum();
        if !sum.is_finite() || (sum - 1.0).abs() > PROB_TOLERANCE {
            return Err(MdpError::NotNormalized { sum });
        }

        Ok(Self {
            entries: entries
                .into_iter()
                .map(|(action, p)| ActionProb::new(action, p.max(0.0)))
                .collect(),
        })
    }

    /// Create a distribution from unnormalized weights.
    ///
    /// ```rust
    /// use semimdp_core::ActionDistribution;
    ///
    /// let d = ActionDistribution::from_weights(vec![(0, 1.0), (1, 3.0)]).unwrap();
    /// assert!((d.probability_of(&1) - 0.75).abs() < 1e-12);
    /// ```
    pub fn from_weights(weights: Vec<(A, f64)>) -> Result<Self, MdpError> {
        if weights.is_empty() {
            return Err(MdpError::EmptyDistribution);
        }

        if let Some(&(_, probability)) = weights.iter().find(|(_, w)| *w < 0.0) {
            return Err(MdpError::NegativeProbability { probability });
        }

        let sum: f64 = weights.iter().map(|(_, w)| w).sum();
        if sum <= 0.0 || !sum.is_finite() {
            return Err(MdpError::ZeroWeights);
        }

        Ok(Self {
            entries: weights
                .into_iter()
                .map(|(action, w)| ActionProb::new(action, w / sum))
                .collect(),
        })
    }

    /// A point mass on a single action.
    pub fn deterministic(action: A) -> Self {
        Self {
            entries: vec![ActionProb::new(action, 1.0)],
        }
    }

    /// Equal probability over every given action.
    pub fn uniform(actions: Vec<A>) -> Result<Self, MdpError> {
        if actions.is_empty() {
            return Err(MdpError::EmptyDistribution);
        }
        let p = 1.0 / actions.len() as f64;
        Ok(Self {
            entries: actions
                .into_iter()
                .map(|action| ActionProb::new(action, p))
                .collect(),
        })
    }

    /// Softmax over preferences scaled by `1 / temperature`.
    ///
    /// Lower temperatures concentrate mass on the highest preference.
    pub fn boltzmann(preferences: Vec<(A, f64)>, temperature: f64) -> Result<Self, MdpError> {
        if preferences.is_empty() {
            return Err(MdpError::EmptyDistribution);
        }
        let values: Vec<f64> = preferences.iter().map(|(_, v)| *v).collect();
        let probs = boltzmann(&values, temperature)?;
        Self::new(
            preferences
                .into_iter()
                .zip(probs)
                .map(|((action, _), p)| (action, p))
                .collect(),
        )
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false for a constructed distribution.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the entries in order.
    pub fn iter(&self) -> impl Iterator<Item = &ActionProb<A>> {
        self.entries.iter()
    }

    /// The entries in order.
    pub fn entries(&self) -> &[ActionProb<A>] {
        &self.entries
    }

    /// Consume the distribution, returning its entries.
    pub fn into_entries(self) -> Vec<ActionProb<A>> {
        self.entries
    }

    /// Sum of all probabilities (1 within tolerance).
    pub fn total(&self) -> f64 {
        self.entries.iter().map(|e| e.probability).sum()
    }

    /// True when one entry carries all of the mass.
    pub fn is_deterministic(&self) -> bool {
        self.entries
            .iter()
            .filter(|e| e.probability > PROB_TOLERANCE)
            .count()
            == 1
    }

    /// Probability of selecting `action`; 0 if it has no entry.
    ///
    /// Linear in the number of entries.
    pub fn probability_of(&self, action: &A) -> f64
    where
        A: PartialEq,
    {
        self.entries
            .iter()
            .find(|e| &e.action == action)
            .map(|e| e.probability)
            .unwrap_or(0.0)
    }

    /// Draw an action. A single-entry distribution consumes no randomness.
    pub fn sample(&self, rng: &mut dyn RngCore) -> &A {
        if let [only] = self.entries.as_slice() {
            return &only.action;
        }
        let roll: f64 = rng.gen();
        self.select(roll)
    }

    /// Select the action whose cumulative bucket contains `roll` in `[0, 1)`.
    ///
    /// Walks the entries in order and returns the first action whose
    /// cumulative probability exceeds `roll`. A roll that lands in the
    /// floating-point shortfall past the final bucket is absorbed by the last
    /// entry with positive probability.
    pub fn select(&self, roll: f64) -> &A {
        let mut cumulative = 0.0;
        let mut last_positive = 0;
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.probability <= 0.0 {
                continue;
            }
            cumulative += entry.probability;
            last_positive = i;
            if roll < cumulative {
                return &entry.action;
            }
        }
        &self.entries[last_positive].action
    }

    /// Transform the actions, keeping probabilities.
    pub fn map<B, F>(self, mut f: F) -> ActionDistribution<B>
    where
        F: FnMut(A) -> B,
    {
        ActionDistribution {
            entries: self
                .entries
                .into_iter()
                .map(|e| ActionProb::new(f(e.action), e.probability))
                .collect(),
        }
    }
}

impl<A> IntoIterator for ActionDistribution<A> {
    type Item = ActionProb<A>;
    type IntoIter = std::vec::IntoIter<ActionProb<A>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Boltzmann (softmax) probabilities for `preferences` at `temperature`.
///
/// `P(i) = exp(v_i / T) / Σ_j exp(v_j / T)`, computed after subtracting the
/// maximum scaled preference so large values don't overflow.
///
/// Infinite scaled preferences are the limit of the softmax: when the
/// maximum is `+∞` (an infinite Q-value, or `v / T` overflowing) the mass
/// is shared evenly by the entries at `+∞`; when every entry is `-∞` the
/// result is uniform. NaN preferences are rejected.
pub fn boltzmann(preferences: &[f64], temperature: f64) -> Result<Vec<f64>, MdpError> {
    if preferences.is_empty() {
        return Err(MdpError::EmptyDistribution);
    }
    if temperature <= 0.0 || !temperature.is_finite() {
        return Err(MdpError::InvalidTemperature { temperature });
    }
    if let Some(&value) = preferences.iter().find(|v| v.is_nan()) {
        return Err(MdpError::InvalidPreference { value });
    }

    let scaled: Vec<f64> = preferences.iter().map(|v| v / temperature).collect();
    let max = scaled.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let weights: Vec<f64> = if max.is_infinite() {
        scaled.iter().map(|v| if *v == max { 1.0 } else { 0.0 }).collect()
    } else {
        scaled.iter().map(|v| (v - max).exp()).collect()
    };

    let sum: f64 = weights.iter().sum();
    if !sum.is_finite() || sum <= 0.0 {
        return Err(MdpError::NotNormalized { sum });
    }
    Ok(weights.into_iter().map(|w| w / sum).collect())
}
