
use std::fmt::Debug;

/// A scored position in a [`SearchIndex`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub slot: usize,
    pub score: f32,
}

/// Nearest-neighbour structure over a collection's vectors
///
/// Slots are dense and follow insertion order. Implementations must return
/// neighbours by descending score, breaking ties by the lower slot.
pub trait SearchIndex: Clone + Debug + Send + Sync {
    fn with_dimension(dimension: usize) -> Self;

    fn len(&self) -> usize;

    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a vector as the next slot
    fn push(&mut self, vector: &[f32]);

    /// Drop every slot whose `keep` entry is false, preserving the order of the rest
    fn retain(&mut self, keep: &[bool]);

    /// At most `k` neighbours of `query`
    fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor>;
}

/// Exact scan over L2-normalised vectors stored contiguously
#[derive(Debug, Clone, Default)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl SearchIndex for FlatIndex {
    #[inline]
    fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    #[inline]
    fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    #[inline]
    fn push(&mut self, vector: &[f32]) {
        let start = self.data.len();
        self.data.extend_from_slice(vector);
        normalize(&mut self.data[start..]);
    }

    #[inline]
    fn retain(&mut self, keep: &[bool]) {
        if self.dimension == 0 {
            return;
        }

        let mut kept = Vec::with_capacity(self.data.len());
        for (vector, keep) in self.data.chunks_exact(self.dimension).zip(keep) {
            if *keep {
                kept.extend_from_slice(vector);
            }
        }
        self.data = kept;
    }

    #[inline]
    fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        if k == 0 || self.dimension == 0 || query.len() != self.dimension {
            return Vec::new();
        }

        let mut query = query.to_vec();
        normalize(&mut query);

        let mut neighbors: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(slot, vector)| Neighbor {
                slot,
                score: dot(&query, vector),
            })
            .collect();

        neighbors.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.slot.cmp(&b.slot)));
        neighbors.truncate(k);
        neighbors
    }
}

/// Scale `vector` to unit length; zero vectors are left as they are
#[inline]
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// True when no component is NaN or infinite
#[inline]
pub fn is_finite(vector: &[f32]) -> bool {
    vector.iter().all(|v| v.is_finite())
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
