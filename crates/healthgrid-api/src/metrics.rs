//! Prometheus text exposition format.
//!
//! Renders the check registry into gauges labelled by check name.

use healthgrid_model::HealthCheck;

/// Render a snapshot of all checks into Prometheus text format.
pub fn render_prometheus(checks: &[HealthCheck]) -> String {
    let mut out = String::new();

    out.push_str("# HELP healthgrid_check_total Number of registered health checks.\n");
    out.push_str("# TYPE healthgrid_check_total gauge\n");
    out.push_str(&format!("healthgrid_check_total {}\n", checks.len()));

    out.push_str("# HELP healthgrid_check_ok Whether the latest run of the check passed (1) or not (0).\n");
    out.push_str("# TYPE healthgrid_check_ok gauge\n");
    for c in checks {
        out.push_str(&format!(
            "healthgrid_check_ok{{check=\"{}\"}} {}\n",
            escape_label(&c.name),
            u8::from(c.status.ok)
        ));
    }

    out.push_str("# HELP healthgrid_check_failures Consecutive failed runs of the check.\n");
    out.push_str("# TYPE healthgrid_check_failures gauge\n");
    for c in checks {
        out.push_str(&format!(
            "healthgrid_check_failures{{check=\"{}\"}} {}\n",
            escape_label(&c.name),
            c.status.consecutive_failures
        ));
    }

    out
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(name: &str, ok: bool, failures: u32) -> HealthCheck {
        let mut check = HealthCheck::new(name, "default", 60, 30);
        check.status.ok = ok;
        check.status.consecutive_failures = failures;
        check
    }

    #[test]
    fn render_empty_registry() {
        let output = render_prometheus(&[]);
        assert!(output.contains("# TYPE healthgrid_check_total gauge"));
        assert!(output.contains("healthgrid_check_total 0\n"));
        assert!(!output.contains("{check="));
    }

    #[test]
    fn render_per_check_gauges() {
        let output = render_prometheus(&[check("dns-check", true, 0), check("pod-check", false, 3)]);

        assert!(output.contains("healthgrid_check_total 2\n"));
        assert!(output.contains("healthgrid_check_ok{check=\"dns-check\"} 1\n"));
        assert!(output.contains("healthgrid_check_ok{check=\"pod-check\"} 0\n"));
        assert!(output.contains("healthgrid_check_failures{check=\"pod-check\"} 3\n"));
    }

    #[test]
    fn label_values_are_escaped() {
        let output = render_prometheus(&[check("a\"b\\c", true, 0)]);
        assert!(output.contains(r#"healthgrid_check_ok{check="a\"b\\c"} 1"#));
    }
}
