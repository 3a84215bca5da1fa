//! Human-readable byte counts

/// How object sizes are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeFormat {
    /// Plain byte count
    Bytes,
    /// Powers of 1024
    Iec,
    /// Powers of 1000
    Si,
}

impl SizeFormat {
    /// `--si` wins over `--human-readable`
    pub fn from_flags(human_readable: bool, si: bool) -> Self {
        if si {
            SizeFormat::Si
        } else if human_readable {
            SizeFormat::Iec
        } else {
            SizeFormat::Bytes
        }
    }

    /// Human-readable size, or `None` for plain byte counts
    pub fn human(self, bytes: u64) -> Option<String> {
        match self {
            SizeFormat::Bytes => None,
            SizeFormat::Iec => Some(byte_count_iec(bytes)),
            SizeFormat::Si => Some(byte_count_si(bytes)),
        }
    }
}

/// Format bytes by powers of 1024 (`512 B`, `1.5 KiB`, `2.0 MiB`)
pub fn byte_count_iec(bytes: u64) -> String {
    byte_count(bytes, 1024, "KMGTPE", "iB")
}

/// Format bytes by powers of 1000 (`512 B`, `1.5 kB`, `2.0 MB`)
pub fn byte_count_si(bytes: u64) -> String {
    byte_count(bytes, 1000, "kMGTPE", "B")
}

fn byte_count(bytes: u64, unit: u64, prefixes: &str, suffix: &str) -> String {
    if bytes < unit {
        return format!("{} B", bytes);
    }

    let mut div = unit;
    let mut exp = 0usize;
    let mut n = bytes / unit;
    while n >= unit {
        div *= unit;
        exp += 1;
        n /= unit;
    }

    let prefix = prefixes.as_bytes()[exp] as char;
    format!("{:.1} {}{}", bytes as f64 / div as f64, prefix, suffix)
}
