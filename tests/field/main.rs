use std::collections::BTreeMap;

use rand::{Rng, SeedableRng, rngs::StdRng};
use vigil::field::{
    Adjacency, DEFAULT_DIFFUSION_COEFFICIENT, LEAK_GAMMA_MAX, LEAK_GAMMA_MIN, SalienceField,
    co_occurrence_adjacency,
};

fn ring(nodes: &[&str]) -> Adjacency {
    let len = nodes.len();
    nodes
        .iter()
        .enumerate()
        .map(|(index, node)| {
            let left = nodes[(index + len - 1) % len].to_string();
            let right = nodes[(index + 1) % len].to_string();
            (node.to_string(), vec![left, right])
        })
        .collect()
}

#[test]
fn given_nonnegative_field_when_diffusing_then_each_node_stays_within_step_bound() {
    let nodes = ["a", "b", "c", "d", "e", "f"];
    let adjacency = ring(&nodes);
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..25 {
        let gamma = rng.random_range(LEAK_GAMMA_MIN..=LEAK_GAMMA_MAX);
        let mut field = SalienceField::new(DEFAULT_DIFFUSION_COEFFICIENT);
        for node in nodes {
            field.deposit(&[node.to_string()], rng.random_range(0.0..5.0));
        }
        let before = field.snapshot();
        let total_before: f64 = before.values().sum();

        field.diffuse(&adjacency, gamma);

        for (node, neighbors) in &adjacency {
            let current = before.get(node).copied().unwrap_or(0.0);
            let neighbor_sum: f64 = neighbors
                .iter()
                .map(|neighbor| before.get(neighbor).copied().unwrap_or(0.0))
                .sum();
            let bound = (1.0 - gamma) * current + DEFAULT_DIFFUSION_COEFFICIENT * neighbor_sum;
            assert!(
                field.value(node) <= bound + 1e-12,
                "{node}: {} exceeds {bound}",
                field.value(node)
            );
        }
        let total_after: f64 = field.snapshot().values().sum();
        assert!(total_after <= total_before + 1e-9);
    }
}

#[test]
fn given_repeated_steps_when_no_new_deposits_then_mass_decays_towards_zero() {
    let adjacency = ring(&["a", "b", "c"]);
    let mut field = SalienceField::default();
    field.deposit(&["a".to_string()], 3.0);

    let mut previous = 3.0;
    for _ in 0..200 {
        field.diffuse(&adjacency, 0.1);
        let total: f64 = field.snapshot().values().sum();
        assert!(total <= previous + 1e-12);
        previous = total;
    }
    assert!(previous < 1e-3);
}

#[test]
fn given_unlisted_node_when_diffusing_then_it_is_untouched() {
    let mut field = SalienceField::default();
    field.deposit(&["a".to_string(), "b".to_string(), "lonely".to_string()], 3.0);
    let adjacency = BTreeMap::from([
        ("a".to_string(), vec!["b".to_string()]),
        ("b".to_string(), vec!["a".to_string()]),
    ]);

    field.diffuse(&adjacency, 0.3);
    assert_eq!(field.value("lonely"), 1.0);
    assert!(field.value("a") < 1.0);
}

#[test]
fn given_dominant_source_when_detecting_hotspots_then_only_it_is_reported() {
    let mut field = SalienceField::default();
    field.deposit(&["pager".to_string()], 4.0);
    field.deposit(&["newsletter".to_string()], 0.9);

    let hotspots = field.detect_hotspots(0.5);
    assert_eq!(hotspots.len(), 1);
    assert_eq!(hotspots[0].node, "pager");

    let quiet = SalienceField::default();
    assert!(quiet.detect_hotspots(0.5).is_empty());
}

#[test]
fn co_occurrence_adjacency_is_symmetric() {
    let adjacency = co_occurrence_adjacency([
        ("pager", "alert"),
        ("grafana", "alert"),
        ("slack", "alert"),
        ("slack", "chat"),
        ("mail", "chat"),
    ]);
    for (node, neighbors) in &adjacency {
        for neighbor in neighbors {
            assert!(
                adjacency[neighbor].contains(node),
                "{neighbor} should link back to {node}"
            );
        }
    }
    assert_eq!(adjacency["slack"].len(), 3);
}
