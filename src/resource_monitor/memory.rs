//! Process memory sampling.

/// Resident set size in bytes. Parses `/proc/self/statm` directly on Linux
/// (page count * page size, no new dependency); reports `0` everywhere else,
/// which the monitor treats as "never trips back-pressure" rather than an error.
#[must_use]
pub fn sample_rss_bytes() -> u64 {
    #[cfg(target_os = "linux")]
    {
        linux::sample()
    }
    #[cfg(not(target_os = "linux"))]
    {
        0
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use std::fs;

    pub(super) fn sample() -> u64 {
        let Ok(contents) = fs::read_to_string("/proc/self/statm") else {
            return 0;
        };
        parse_statm(&contents)
    }

    /// `/proc/self/statm` is a single line of whitespace-separated page
    /// counts: `size resident shared text lib data dirty`. Field 2 (index 1)
    /// is resident set size in pages.
    pub(super) fn parse_statm(contents: &str) -> u64 {
        let Some(resident_pages) = contents.split_whitespace().nth(1) else {
            return 0;
        };
        let Ok(pages) = resident_pages.parse::<u64>() else {
            return 0;
        };
        #[allow(clippy::cast_sign_loss)]
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) }.max(0) as u64;
        pages.saturating_mul(page_size)
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::linux::parse_statm;

    #[test]
    fn parses_resident_page_count_from_second_field() {
        assert_eq!(parse_statm("1000 250 10 1 0 900 0"), 250 * page_size());
    }

    #[test]
    fn malformed_line_reports_zero() {
        assert_eq!(parse_statm(""), 0);
        assert_eq!(parse_statm("not a number"), 0);
    }

    fn page_size() -> u64 {
        #[allow(clippy::cast_sign_loss)]
        unsafe {
            libc::sysconf(libc::_SC_PAGESIZE).max(0) as u64
        }
    }
}
