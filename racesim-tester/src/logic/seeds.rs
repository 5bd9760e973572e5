use anyhow::{Result, bail};

/// Keyword that stands for the seed stored in the scenario file.
const SCENARIO_KEYWORD: &str = "scenario";

/// Resolve CLI seed tokens into run seeds.
///
/// Accepts decimal integers (negative values use their magnitude), `0x`
/// hexadecimal, and `scenario`. Duplicates keep their first position; an
/// empty list falls back to the scenario seed.
pub fn resolve_seed_inputs(tokens: &[String], scenario_seed: u64) -> Result<Vec<u64>> {
    let mut seeds: Vec<u64> = Vec::new();
    for token in tokens {
        if token.is_empty() {
            continue;
        }
        let seed = if token.eq_ignore_ascii_case(SCENARIO_KEYWORD) {
            scenario_seed
        } else if let Some(hex) = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
        {
            match u64::from_str_radix(hex, 16) {
                Ok(value) => value,
                Err(_) => bail!("Unrecognized seed token: {token}"),
            }
        } else if let Ok(value) = token.parse::<i64>() {
            value.unsigned_abs()
        } else if let Ok(value) = token.parse::<u64>() {
            value
        } else {
            bail!("Unrecognized seed token: {token}");
        };
        if !seeds.contains(&seed) {
            seeds.push(seed);
        }
    }
    if seeds.is_empty() {
        seeds.push(scenario_seed);
    }
    Ok(seeds)
}

pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}
