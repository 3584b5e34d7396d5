use super::vector::DistanceMetric;

pub fn l2_norm(v: &[f32]) -> f32 {
    let mut sum = 0.0f32;
    for x in v {
        sum += x * x;
    }
    sum.sqrt()
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
    }
    dot
}

pub fn cosine_similarity(a: &[f32], b: &[f32], a_norm: f32, b_norm: f32) -> f32 {
    dot(a, b) / (a_norm * b_norm)
}

pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    let mut sum = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        let d = x - y;
        sum += d * d;
    }
    sum
}

/// Distance under `metric`; smaller is closer. `None` when cosine is undefined (zero norm).
pub fn distance(metric: DistanceMetric, query: &[f32], query_norm: f32, v: &[f32]) -> Option<f32> {
    match metric {
        DistanceMetric::Cosine => {
            let v_norm = l2_norm(v);
            if query_norm == 0.0 || v_norm == 0.0 {
                return None;
            }
            Some(1.0 - cosine_similarity(query, v, query_norm, v_norm))
        }
        DistanceMetric::L2 => Some(squared_l2(query, v)),
        DistanceMetric::Ip => Some(1.0 - dot(query, v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_distance_bounds() {
        let q = [1.0, 0.0];
        let n = l2_norm(&q);
        assert_eq!(distance(DistanceMetric::Cosine, &q, n, &[2.0, 0.0]), Some(0.0));
        assert_eq!(distance(DistanceMetric::Cosine, &q, n, &[0.0, 3.0]), Some(1.0));
        assert_eq!(distance(DistanceMetric::Cosine, &q, n, &[-1.0, 0.0]), Some(2.0));
        assert_eq!(distance(DistanceMetric::Cosine, &q, n, &[0.0, 0.0]), None);
    }

    #[test]
    fn l2_and_ip() {
        let q = [1.0, 2.0];
        assert_eq!(distance(DistanceMetric::L2, &q, l2_norm(&q), &[1.0, 0.0]), Some(4.0));
        assert_eq!(distance(DistanceMetric::Ip, &q, l2_norm(&q), &[1.0, 1.0]), Some(-2.0));
    }
}
