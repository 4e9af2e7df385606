use crate::domain::model::SystemStats;

/// Collect the load/memory record for the stats widget. Linux-only reads
/// from /proc; elsewhere (and on any read failure) there is simply no
/// record this tick.
pub fn collect() -> Option<SystemStats> {
    let load_one = read_loadavg()?;
    let (mem_total_mb, mem_used_mb) = read_meminfo()?;
    Some(SystemStats {
        load_one,
        mem_used_mb,
        mem_total_mb,
    })
}

fn read_loadavg() -> Option<f64> {
    let content = std::fs::read_to_string("/proc/loadavg").ok()?;
    content.split_whitespace().next()?.parse().ok()
}

fn read_meminfo() -> Option<(u64, u64)> {
    let content = std::fs::read_to_string("/proc/meminfo").ok()?;
    let mut total_kb = None;
    let mut available_kb = None;
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total_kb = rest.trim().split_whitespace().next()?.parse::<u64>().ok();
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available_kb = rest.trim().split_whitespace().next()?.parse::<u64>().ok();
        }
        if total_kb.is_some() && available_kb.is_some() {
            break;
        }
    }
    let total = total_kb?;
    let available = available_kb?;
    Some((total / 1024, (total.saturating_sub(available)) / 1024))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_on_linux() {
        // On Linux /proc exists; the record must be internally consistent.
        if let Some(stats) = collect() {
            assert!(stats.mem_total_mb >= stats.mem_used_mb);
            assert!(stats.load_one >= 0.0);
        }
    }
}
