use rand::{
    thread_rng, Rng,
    distributions,
};


pub fn generate_rand_id(length: usize) -> String {
    thread_rng()
        .sample_iter(&distributions::Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Trimmed text, or `None` when nothing but whitespace was given.
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}
