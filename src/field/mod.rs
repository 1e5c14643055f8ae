pub mod diffusion;

pub use diffusion::{
    Adjacency, DEFAULT_DIFFUSION_COEFFICIENT, DEFAULT_HOTSPOT_THRESHOLD, Hotspot, LEAK_GAMMA_MAX,
    LEAK_GAMMA_MIN, PRUNE_EPSILON, SalienceField, clamp_leak_gamma, co_occurrence_adjacency,
};
