use reel_core::MovieTable;

use crate::{
    director_groups, franchise_groups, franchise_vs_standalone, search_cast_with_director,
    search_genres_with_cast, PartitionStats, SearchPresets,
};

fn num(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".to_string())
}

fn text(value: Option<&str>) -> String {
    value.map(|v| v.replace('|', "\\|")).unwrap_or_else(|| "-".to_string())
}

fn partition_line(label: &str, stats: &PartitionStats) -> String {
    format!(
        "| {label} | {} | {} | {} | {} | {} | {} |",
        stats.movies,
        num(stats.mean_revenue_musd),
        num(stats.mean_roi),
        num(stats.mean_budget_musd),
        num(stats.mean_popularity),
        num(stats.mean_vote_average),
    )
}

pub fn render_markdown_report(table: &MovieTable, presets: &SearchPresets) -> String {
    let mut lines = vec![
        "# Reel Box Office Report".to_string(),
        String::new(),
        format!("- Movies: {}", table.len()),
        String::new(),
        "## Franchise vs Standalone".to_string(),
        String::new(),
        "| Group | Movies | Mean revenue (M USD) | Mean ROI | Mean budget (M USD) | Mean popularity | Mean rating |".to_string(),
        "|---|---|---|---|---|---|---|".to_string(),
    ];
    let split = franchise_vs_standalone(table);
    lines.push(partition_line("Franchise", &split.franchise));
    lines.push(partition_line("Standalone", &split.standalone));

    lines.extend([
        String::new(),
        "## Top Franchises".to_string(),
        String::new(),
        "| Collection | Movies | Budget sum | Budget mean | Revenue sum | Revenue mean | Mean rating |".to_string(),
        "|---|---|---|---|---|---|---|".to_string(),
    ]);
    for g in franchise_groups(table) {
        lines.push(format!(
            "| {} | {} | {:.2} | {} | {:.2} | {} | {} |",
            text(Some(g.collection.as_str())),
            g.movies,
            g.budget_musd_sum,
            num(g.budget_musd_mean),
            g.revenue_musd_sum,
            num(g.revenue_musd_mean),
            num(g.vote_average_mean),
        ));
    }

    lines.extend([
        String::new(),
        "## Top Directors".to_string(),
        String::new(),
        "| Director | Movies | Revenue sum (M USD) | Mean rating |".to_string(),
        "|---|---|---|---|".to_string(),
    ]);
    for g in director_groups(table) {
        lines.push(format!(
            "| {} | {} | {:.2} | {} |",
            text(Some(g.director.as_str())),
            g.movies,
            g.revenue_musd_sum,
            num(g.vote_average_mean)
        ));
    }

    for query in &presets.genre_cast {
        lines.push(String::new());
        lines.push(format!(
            "## {} in {}",
            query.actor,
            query.genres.join(" & ")
        ));
        lines.push(String::new());
        let hits = search_genres_with_cast(table, query);
        if hits.is_empty() {
            lines.push("_no matches_".to_string());
            continue;
        }
        lines.push("| Title | Genres | Rating |".to_string());
        lines.push("|---|---|---|".to_string());
        for hit in hits {
            lines.push(format!(
                "| {} | {} | {} |",
                text(hit.title.as_deref()),
                text(hit.genres.as_deref()),
                num(hit.vote_average)
            ));
        }
    }

    for query in &presets.cast_director {
        lines.push(String::new());
        lines.push(format!("## {} directed by {}", query.actor, query.director));
        lines.push(String::new());
        let hits = search_cast_with_director(table, query);
        if hits.is_empty() {
            lines.push("_no matches_".to_string());
            continue;
        }
        lines.push("| Title | Runtime | Director |".to_string());
        lines.push("|---|---|---|".to_string());
        for hit in hits {
            lines.push(format!(
                "| {} | {} | {} |",
                text(hit.title.as_deref()),
                num(hit.runtime),
                text(hit.director.as_deref())
            ));
        }
    }

    lines.push(String::new());
    lines.join("\n")
}
