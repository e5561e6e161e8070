use unicode_width::UnicodeWidthStr;

use crate::models::Dimension;
use crate::pipeline::calibrate::{Priority, LABEL_THRESHOLDS, WEIGHTS};
use crate::pipeline::report::{Report, SCHEMA_VERSION};

/// Format a duration in minutes to a human-readable string.
pub fn format_minutes(minutes: f64) -> String {
    let total = (minutes * 60.0).max(0.0) as u64;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    if h > 0 {
        format!("{h}h{m:02}m")
    } else if m > 0 {
        format!("{m}m{s:02}s")
    } else {
        format!("{s}s")
    }
}

/// Truncate a string to fit within max_width (respecting unicode width).
fn truncate(s: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }
    let mut result = String::new();
    let mut width = 0;
    for ch in s.chars() {
        let cw = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + cw + 3 > max_width {
            result.push_str("...");
            break;
        }
        result.push(ch);
        width += cw;
    }
    result
}

fn bar(score: f64) -> String {
    let filled = ((score / 10.0).round() as usize).min(10);
    format!("{}{}", "#".repeat(filled), ".".repeat(10 - filled))
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Render a finished report for the terminal.
pub fn print_report(report: &Report) {
    let overall = &report.overall_health;
    println!(
        "Communication health: {:.1}/100 ({}), confidence {:.0}%\n",
        overall.score,
        overall.label.as_str(),
        overall.confidence * 100.0
    );

    for line in textwrap(&report.summary, 76) {
        println!("  {line}");
    }

    println!("\n  {:<16} {:>6}  {:<10}  {:<10}", "DIMENSION", "SCORE", "", "LABEL");
    println!("  {}", "-".repeat(48));
    for dim in Dimension::ALL {
        if let Some(d) = report.dimensions.get(&dim) {
            println!(
                "  {:<16} {:>6.1}  {}  {:<10}",
                dim.as_str(),
                d.score,
                bar(d.score),
                d.label.as_str()
            );
        }
    }

    let content = &report.extracted_content;
    if !content.decisions.is_empty() {
        println!("\nDecisions ({}):", content.decisions.len());
        for d in &content.decisions {
            println!("  - {}", truncate(d, 76));
        }
    }
    if !content.action_items.is_empty() {
        println!("\nAction Items ({}):", content.action_items.len());
        for ai in &content.action_items {
            let owner = ai.owner.as_deref().unwrap_or("unassigned");
            let due = ai
                .due_date
                .as_deref()
                .map(|d| format!(", due {d}"))
                .unwrap_or_default();
            println!("  - {} [{owner}{due}]", truncate(&ai.task, 56));
        }
    }
    if !content.risk_flags.is_empty() {
        println!("\nRisks ({}):", content.risk_flags.len());
        for r in &content.risk_flags {
            println!("  - {}", truncate(r, 76));
        }
    }
    if !content.key_topics.is_empty() {
        let topics: Vec<&str> = content.key_topics.iter().map(|t| t.item.as_str()).collect();
        println!("\nTopics: {}", truncate(&topics.join(", "), 70));
    }

    for (title, items) in [
        ("Going well", &content.positive_examples),
        ("Could improve", &content.areas_for_improvement),
    ] {
        if items.is_empty() {
            continue;
        }
        println!("\n{title}:");
        for e in items {
            println!(
                "  {}: {}",
                truncate(&e.speaker, 16),
                truncate(&e.text.replace('\n', " "), 58)
            );
        }
    }

    let quoted: usize = report.evidence.values().map(Vec::len).sum();
    if quoted > 0 {
        println!("\nEvidence:");
        for (dim, items) in &report.evidence {
            for e in items {
                println!(
                    "  {:<16} #{:<4} {}: {}",
                    dim.as_str(),
                    e.turn_index,
                    truncate(&e.speaker, 16),
                    truncate(&e.text.replace('\n', " "), 48)
                );
            }
        }
    }

    if !report.recommendations.is_empty() {
        println!("\nRecommendations:");
        for r in &report.recommendations {
            let tag = match r.priority {
                Priority::High => "HIGH",
                Priority::Medium => "MED ",
                Priority::Low => "LOW ",
            };
            println!("  [{tag}] {}", truncate(&r.issue, 68));
            println!("         {}", truncate(&r.suggestion, 68));
        }
    }

    let stats = &report.statistics.conversation;
    println!("\nStatistics:");
    println!("  Turns:     {}", stats.turn_count);
    println!("  Speakers:  {}", stats.speaker_count);
    println!("  Words:     {}", stats.total_words);
    println!(
        "  Questions: {} ({:.0}%)",
        stats.question_count,
        stats.question_ratio * 100.0
    );
    if let Some(lat) = &stats.latency {
        println!(
            "  Replies:   median {}, p90 {} ({} sample{})",
            format_minutes(lat.median_minutes),
            format_minutes(lat.p90_minutes),
            lat.samples,
            plural(lat.samples)
        );
    }
    if let Some(d) = stats.duration_minutes {
        println!("  Duration:  {}", format_minutes(d));
    }

    let meta = &report.metadata;
    if !meta.pipeline_issues.is_empty() {
        println!("\nPipeline issues ({}):", meta.pipeline_issues.len());
        for issue in &meta.pipeline_issues {
            println!("  - {}", truncate(&issue.to_string(), 76));
        }
    }
    println!(
        "\n  run {} | {} chunk{} | {} LLM call{}",
        meta.run_id,
        meta.chunk_count,
        plural(meta.chunk_count),
        meta.llm_calls,
        plural(meta.llm_calls)
    );
}

/// Print scoring constants for `commhealth info`.
pub fn print_info() {
    println!("commhealth v{}", env!("CARGO_PKG_VERSION"));
    println!("  Report schema: v{SCHEMA_VERSION}");
    println!("\n  Weights:");
    for (dim, w) in WEIGHTS {
        println!("    {:<16} {:.2}", dim.as_str(), w);
    }
    println!("\n  Labels:");
    for (label, min) in LABEL_THRESHOLDS {
        println!("    {:<16} >= {min}", label.as_str());
    }
    println!("    {:<16} <  {}", "poor", LABEL_THRESHOLDS[2].1);
}

/// Greedy word wrap by display width.
fn textwrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let needed = UnicodeWidthStr::width(current.as_str())
            + UnicodeWidthStr::width(word)
            + usize::from(!current.is_empty());
        if needed > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
