use super::{colorize_outcome, json_pretty, EXIT_SUCCESS};
use kiln_core::{GroupReport, ModuleReport};
use kiln_store::StoreLayout;

fn phase_ms(module: &ModuleReport) -> (u64, u64) {
    [&module.detect, &module.build]
        .into_iter()
        .flatten()
        .fold((0, 0), |(user, internal), p| {
            (user + p.user_ms, internal + p.internal_ms)
        })
}

pub fn run(layout: &StoreLayout, json: bool) -> Result<u8, String> {
    let report = GroupReport::read(layout)
        .map_err(|e| format!("store error: {e}"))?
        .ok_or_else(|| format!("no report found at {}", layout.report_file().display()))?;

    if json {
        println!("{}", json_pretty(&report)?);
        return Ok(EXIT_SUCCESS);
    }

    println!("started:   {}", report.started_at);
    println!("exit code: {}", report.exit_code);
    println!(
        "{:<16} {:<11} {:<5} {:<6} {:<7} {:<8} INTERNAL_MS",
        "BUILDPACK", "OUTCOME", "EXIT", "HITS", "MISSES", "USER_MS"
    );
    for module in &report.modules {
        let (user_ms, internal_ms) = phase_ms(module);
        let outcome = module.outcome.to_string();
        let padded = format!("{outcome:<11}");
        println!(
            "{:<16} {} {:<5} {:<6} {:<7} {:<8} {}",
            module.buildpack,
            padded.replacen(&outcome, &colorize_outcome(&outcome), 1),
            module.exit_code,
            module.cache_hits(),
            module.cache_misses(),
            user_ms,
            internal_ms
        );
        if let Some(reason) = &module.detect_reason {
            println!("  detect: {reason}");
        }
        if let Some(err) = &module.error {
            match module.failed_stage {
                Some(stage) => println!("  {stage} error ({}): {}", err.kind, err.message),
                None => println!("  error ({}): {}", err.kind, err.message),
            }
        }
    }
    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::{Outcome, PhaseReport};

    #[test]
    fn user_and_internal_time_summed_over_phases() {
        let mut module = ModuleReport::new("go");
        module.outcome = Outcome::Succeeded;
        module.detect = Some(PhaseReport {
            internal_ms: 3,
            ..PhaseReport::default()
        });
        module.build = Some(PhaseReport {
            user_ms: 40,
            internal_ms: 7,
            ..PhaseReport::default()
        });
        assert_eq!(phase_ms(&module), (40, 10));
    }

    #[test]
    fn missing_report_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        let err = run(&layout, false).unwrap_err();
        assert!(err.starts_with("no report found"));
    }
}
