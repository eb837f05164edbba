// ============================================================================
// CPU Parsing
// ============================================================================

/// CPU suffixes and their multiplier relative to one core
const CPU_SUFFIXES: [(char, f64); 3] = [('n', 1e-9), ('u', 1e-6), ('m', 1e-3)];

/// Parse a CPU quantity into cores.
///
/// # Examples
/// - "500m" -> 0.5
/// - "2" -> 2.0
/// - "250000000n" -> 0.25
pub fn parse_cpu(cpu: &str) -> Option<f64> {
    let cpu = cpu.trim();
    let last = cpu.chars().last()?;
    let lower = last.to_ascii_lowercase();

    if let Some((_, multiplier)) = CPU_SUFFIXES.iter().find(|(s, _)| *s == lower) {
        let number = &cpu[..cpu.len() - last.len_utf8()];
        return parse_number(number).map(|v| v * multiplier);
    }

    parse_number(cpu)
}

// ============================================================================
// Memory Parsing
// ============================================================================

const KI: f64 = 1024.0;
const K: f64 = 1000.0;

/// Byte suffixes, two-letter binary units first so "Mi" is never read as "M"
const BYTE_SUFFIXES: [(&str, f64); 12] = [
    ("ki", KI),
    ("mi", KI * KI),
    ("gi", KI * KI * KI),
    ("ti", KI * KI * KI * KI),
    ("pi", KI * KI * KI * KI * KI),
    ("ei", KI * KI * KI * KI * KI * KI),
    ("k", K),
    ("m", K * K),
    ("g", K * K * K),
    ("t", K * K * K * K),
    ("p", K * K * K * K * K),
    ("e", K * K * K * K * K * K),
];

/// Parse a memory or storage quantity into bytes.
///
/// # Examples
/// - "128Mi" -> 134217728
/// - "1G" -> 1000000000
/// - "4096" -> 4096
pub fn parse_bytes(memory: &str) -> Option<f64> {
    let memory = memory.trim();
    if memory.is_empty() {
        return None;
    }

    let lower = memory.to_ascii_lowercase();
    for (suffix, multiplier) in BYTE_SUFFIXES {
        if let Some(number) = lower.strip_suffix(suffix) {
            return parse_number(number).map(|v| v * multiplier);
        }
    }

    parse_number(&lower)
}

fn parse_number(s: &str) -> Option<f64> {
    let value: f64 = s.trim().parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}
