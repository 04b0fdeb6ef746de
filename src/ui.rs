//! Interface de terminal do jobflow: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`RunProgress`] acompanha visualmente
//! uma execução do workflow no terminal.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use jobflow::aggregate::{AggregatedListing, MedianComparison, RunOutput};
use jobflow::error::FailureReason;
use jobflow::registry::RegistryEntry;
use jobflow::state_machine::WorkflowRun;

/// Indicador visual de progresso de uma execução no terminal.
///
/// Exibe um spinner com o estado atual e mensagens coloridas para
/// sucesso (verde), falha (vermelho) e retentativas ou degradações
/// (amarelo).
pub struct RunProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
    dim: Style,
    // Quantos registros de erro já foram impressos.
    errors_seen: usize,
}

impl RunProgress {
    /// Inicia o spinner com a consulta e retorna a instância de progresso.
    pub fn start(query: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("CREATED: {query}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
            errors_seen: 0,
        }
    }

    /// Atualiza o spinner a partir de um snapshot e imprime os novos
    /// registros de erro (retentativas, degradações).
    pub fn update(&mut self, run: &WorkflowRun) {
        let detail = match &run.parsed {
            Some(parsed) => format!("{} in {}", parsed.title, parsed.location),
            None => run.query.raw.clone(),
        };
        self.pb.set_message(format!("{}: {detail}", run.state));

        // O último registro de uma execução que falhou é mostrado por `complete`.
        let printable = if run.failure.is_some() {
            run.errors.len().saturating_sub(1)
        } else {
            run.errors.len()
        };
        for record in run.errors.iter().take(printable).skip(self.errors_seen) {
            self.pb.println(format!(
                "  {} {}: {}",
                self.yellow.apply_to("↻"),
                record.state,
                record.message
            ));
        }
        self.errors_seen = self.errors_seen.max(printable);
    }

    /// Finaliza o spinner e exibe o resultado final da execução.
    pub fn complete(&self, run: &WorkflowRun) {
        self.pb.finish_and_clear();
        match &run.failure {
            None => {
                let (total, enriched) = run
                    .output
                    .as_ref()
                    .map(|o| (o.summary.total_listings, o.summary.fully_enriched))
                    .unwrap_or_default();
                println!(
                    "  {} Run completed: {total} listing(s), {enriched} fully enriched",
                    self.green.apply_to("✓")
                );
            }
            Some(failure) => {
                println!(
                    "  {} Run failed after {}: {}",
                    self.red.apply_to("✗"),
                    failure.last_good_state,
                    failure.reason
                );
                if let FailureReason::InterpretationFailed { suggestions, .. } = &failure.reason {
                    for suggestion in suggestions {
                        println!("    {} {suggestion}", self.dim.apply_to("→"));
                    }
                }
            }
        }
    }

    /// Imprime as vagas agregadas e o resumo.
    pub fn print_output(&self, output: &RunOutput) {
        println!();
        for item in &output.listings {
            println!("{}", self.format_listing(item));
        }

        let summary = &output.summary;
        println!();
        println!("{}", self.green.apply_to("─── Summary ───"));
        println!(
            "  listings: {}  enriched: {}  degraded: {}",
            summary.total_listings, summary.fully_enriched, summary.degraded
        );
        if let (Some(min), Some(max)) = (summary.annual_min, summary.annual_max) {
            println!("  annual range: ${min:.0} - ${max:.0}");
        }
        if let Some(average) = summary.average_annual_midpoint {
            println!("  average midpoint: ${average:.0}");
        }
        println!(
            "  vs labor median: {} above, {} below",
            summary.above_labor_median, summary.below_labor_median
        );
    }

    fn format_listing(&self, item: &AggregatedListing) -> String {
        let salary = item
            .listing
            .salary_range
            .as_deref()
            .unwrap_or("salary not listed");
        let median = match item.vs_labor_median {
            Some(MedianComparison::Above) => self.green.apply_to(" ▲ median").to_string(),
            Some(MedianComparison::Below) => self.red.apply_to(" ▼ median").to_string(),
            Some(MedianComparison::AtMedian) => " = median".to_string(),
            None => String::new(),
        };
        let degraded = if item.fully_enriched() {
            String::new()
        } else {
            self.yellow.apply_to(" (partial enrichment)").to_string()
        };
        format!(
            "  • {} @ {} ({})\n    {}{median}{degraded}\n    {}",
            item.listing.title,
            item.listing.company,
            item.listing.location,
            salary,
            self.dim.apply_to(&item.listing.url)
        )
    }
}

/// Imprime a execução final formatada em JSON.
pub fn print_json(run: &WorkflowRun) {
    println!("{}", serde_json::to_string_pretty(run).unwrap_or_default());
}

/// Imprime a tabela de sub-serviços registrados.
pub fn print_services(entries: &[RegistryEntry]) {
    let green = Style::new().green();
    let red = Style::new().red();
    for entry in entries {
        let status = if entry.healthy {
            green.apply_to("healthy")
        } else {
            red.apply_to("cooling down")
        };
        let capabilities = if entry.endpoint.capabilities.is_empty() {
            "*".to_string()
        } else {
            entry.endpoint.capabilities.join(", ")
        };
        println!(
            "  {:<12} {:<32} {:<14} [{capabilities}]",
            entry.endpoint.name, entry.endpoint.address, status
        );
    }
}
