//! Force readings taken during the measurement sequence.

use serde::Serialize;

/// One peak-force reading at a temperature setpoint and stroke position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Measurement {
    pub temperature: f64,
    pub stroke: f64,
    pub force: f64,
    /// Zero-based repeat index.
    pub repeat: u32,
}

/// A (temperature, stroke) point with the force to judge it by.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeasuredPoint {
    pub temperature: f64,
    pub stroke: f64,
    pub force: f64,
    /// How many readings were averaged into `force`.
    pub samples: u32,
}

impl From<&Measurement> for MeasuredPoint {
    fn from(m: &Measurement) -> Self {
        Self {
            temperature: m.temperature,
            stroke: m.stroke,
            force: m.force,
            samples: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MeasurementSet {
    items: Vec<Measurement>,
}

impl MeasurementSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, m: Measurement) {
        self.items.push(m);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Measurement> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Measurement] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<Measurement> {
        self.items
    }

    /// Repeats folded into one mean force per (temperature, stroke), in the
    /// order each point was first measured.
    pub fn averaged(&self) -> Vec<MeasuredPoint> {
        let mut out: Vec<MeasuredPoint> = Vec::new();
        for m in &self.items {
            match out
                .iter_mut()
                .find(|p| p.temperature == m.temperature && p.stroke == m.stroke)
            {
                Some(p) => {
                    let n = f64::from(p.samples);
                    p.force = p.force.mul_add(n, m.force) / (n + 1.0);
                    p.samples += 1;
                }
                None => out.push(MeasuredPoint::from(m)),
            }
        }
        out
    }
}

impl<'a> IntoIterator for &'a MeasurementSet {
    type Item = &'a Measurement;
    type IntoIter = std::slice::Iter<'a, Measurement>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl FromIterator<Measurement> for MeasurementSet {
    fn from_iter<I: IntoIterator<Item = Measurement>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}
