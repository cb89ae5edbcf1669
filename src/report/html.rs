//! HTML report generation with D3.js visualizations

use crate::loader::{FailureKind, LoadState};
use crate::view::ReportView;
use std::io::{self, Write};

/// Page-level rendering options
#[derive(Debug, Clone, Default)]
pub struct PageOptions {
    /// Auto-refresh interval (seconds) for the loading placeholder
    pub refresh_secs: Option<u32>,
}

/// Render whatever the loader currently holds
pub fn write_state<W: Write>(writer: &mut W, state: &LoadState, options: &PageOptions) -> io::Result<()> {
    match state {
        LoadState::NotLoaded => write_loading(writer, options.refresh_secs),
        LoadState::Failed(err) => write_failed(writer, err.kind(), &err.to_string()),
        LoadState::Loaded(report) => write(writer, &ReportView::from_report(report)),
    }
}

pub fn write_loading<W: Write>(writer: &mut W, refresh_secs: Option<u32>) -> io::Result<()> {
    write_head(writer, "Loading report", refresh_secs)?;
    write!(writer, r#"<body>
    <div class="container">
        <div class="placeholder">
            <div class="spinner"></div>
            <div class="placeholder-text">Loading evaluation report...</div>
        </div>
    </div>
</body>
</html>
"#)
}

pub fn write_failed<W: Write>(writer: &mut W, kind: FailureKind, reason: &str) -> io::Result<()> {
    let detail = match kind {
        FailureKind::Unavailable => "The report endpoint could not be reached or returned an error.",
        FailureKind::Malformed => "The report was received but is not a valid evaluation report.",
    };
    write_head(writer, "Report unavailable", None)?;
    write!(writer, r#"<body>
    <div class="container">
        <div class="placeholder failed">
            <div class="placeholder-title">Could not load report</div>
            <div class="placeholder-text">{detail}</div>
            <pre class="reason">{reason}</pre>
            <div class="placeholder-text">Reload the page to try again.</div>
        </div>
    </div>
</body>
</html>
"#,
        detail = detail,
        reason = html_escape(reason),
    )
}

/// Full report page
pub fn write<W: Write>(writer: &mut W, view: &ReportView) -> io::Result<()> {
    let json_data = script_json(view)?;
    let generated = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");

    let counters: String = view
        .summary
        .counters()
        .iter()
        .map(|(label, value)| {
            format!(
                r#"<div class="stat"><div class="stat-value">{}</div><div class="stat-label">{}</div></div>"#,
                value, label
            )
        })
        .collect::<Vec<_>>()
        .join("\n            ");

    let notice = if view.summary.total_tags == 0 {
        r#"<div class="notice">No evaluated tags yet: there is no data to chart.</div>"#
    } else {
        ""
    };

    write_head(writer, "Model Evaluation Report", None)?;
    write!(writer, r#"<body>
    <div class="container">
        <div class="header">
            <div class="logo">Model Evaluation Report</div>
            <div class="subtitle">Generated {generated}</div>
        </div>

        <div class="stats">
            {counters}
        </div>
        {notice}

        <div class="charts">
            <div class="chart-card">
                <div class="chart-title">Tag outcome distribution</div>
                <div id="donut-chart"></div>
                <div class="donut-legend" id="donut-legend"></div>
            </div>
            <div class="chart-card">
                <div class="chart-title">Accuracy by tag</div>
                <div id="bar-chart"></div>
            </div>
        </div>
    </div>
    <div class="tooltip" id="tooltip"></div>

    <script>
    const data = {json_data};

    const tooltip = document.getElementById('tooltip');
    function showTooltip(event, html) {{
        tooltip.innerHTML = html;
        tooltip.style.display = 'block';
        tooltip.style.left = (event.pageX + 12) + 'px';
        tooltip.style.top = (event.pageY + 12) + 'px';
    }}
    function hideTooltip() {{
        tooltip.style.display = 'none';
    }}
    function escapeHtml(s) {{
        return String(s).replace(/[&<>"']/g, c => ({{'&':'&amp;','<':'&lt;','>':'&gt;','"':'&quot;',"'":'&#39;'}}[c]));
    }}

    // Outcome donut
    function drawDonutChart() {{
        const width = 300, height = 300;
        const radius = Math.min(width, height) / 2;

        const svg = d3.select('#donut-chart')
            .append('svg')
            .attr('width', width)
            .attr('height', height)
            .append('g')
            .attr('transform', `translate(${{width/2}},${{height/2}})`);

        const slices = data.distribution.filter(d => d.value > 0);

        const pie = d3.pie().value(d => d.value).sort(null);
        const arc = d3.arc().innerRadius(radius * 0.6).outerRadius(radius * 0.9);
        const arcHover = d3.arc().innerRadius(radius * 0.6).outerRadius(radius * 0.95);

        if (slices.length === 0) {{
            svg.append('circle')
                .attr('r', radius * 0.75)
                .attr('fill', 'none')
                .attr('stroke', '#30363d')
                .attr('stroke-width', radius * 0.3);
        }}

        const arcs = svg.selectAll('g.slice')
            .data(pie(slices))
            .enter()
            .append('g')
            .attr('class', 'slice');

        arcs.append('path')
            .attr('d', arc)
            .attr('fill', d => d.data.color)
            .attr('stroke', '#0d1117')
            .attr('stroke-width', 2)
            .style('cursor', 'pointer')
            .on('mouseover', function(event, d) {{
                d3.select(this).transition().duration(100).attr('d', arcHover);
                showTooltip(event, `${{escapeHtml(d.data.name)}}: ${{d.data.value}} tags (${{d.data.label}})`);
            }})
            .on('mouseout', function() {{
                d3.select(this).transition().duration(100).attr('d', arc);
                hideTooltip();
            }});

        arcs.append('text')
            .attr('transform', d => `translate(${{arc.centroid(d)}})`)
            .attr('text-anchor', 'middle')
            .attr('dy', '0.35em')
            .style('font-size', '0.8rem')
            .style('fill', '#0d1117')
            .style('pointer-events', 'none')
            .text(d => d.data.label);

        // Center statistic
        svg.append('text')
            .attr('text-anchor', 'middle')
            .attr('dy', '-0.6em')
            .style('font-size', '0.875rem')
            .style('fill', '#7d8590')
            .text('Overall accuracy');

        svg.append('text')
            .attr('text-anchor', 'middle')
            .attr('dy', '0.9em')
            .style('font-size', data.overall_accuracy === null ? '1.25rem' : '2rem')
            .style('font-weight', '700')
            .style('fill', '#e6edf3')
            .text(data.overall_accuracy_label);

        const legend = d3.select('#donut-legend');
        data.distribution.forEach(d => {{
            const item = legend.append('div').attr('class', 'legend-item');
            item.append('span').attr('class', 'legend-dot').style('background', d.color);
            item.append('span').text(`${{d.name}} ${{d.value}}`);
        }});
    }}

    // Ranked accuracy bars
    function drawBarChart() {{
        const bars = data.ranking.concat(data.unranked);
        const container = document.getElementById('bar-chart');
        if (bars.length === 0) {{
            container.innerHTML = '<div class="placeholder-text">no data</div>';
            return;
        }}

        const margin = {{ top: 10, right: 70, bottom: 30, left: 140 }};
        const rowHeight = 28;
        const width = Math.max(container.clientWidth, 400) - margin.left - margin.right;
        const height = bars.length * rowHeight;

        const svg = d3.select('#bar-chart')
            .append('svg')
            .attr('width', width + margin.left + margin.right)
            .attr('height', height + margin.top + margin.bottom)
            .append('g')
            .attr('transform', `translate(${{margin.left}},${{margin.top}})`);

        const y = d3.scaleBand()
            .domain(bars.map(d => d.tag))
            .range([0, height])
            .padding(0.2);

        const x = d3.scaleLinear()
            .domain([0, Math.max(100, d3.max(bars, d => d.accuracy || 0))])
            .range([0, width]);

        svg.append('g')
            .attr('class', 'grid')
            .call(d3.axisBottom(x).tickSize(height).tickFormat(''))
            .style('stroke-dasharray', '3,3')
            .style('stroke-opacity', 0.1);

        const rows = svg.selectAll('.bar-row')
            .data(bars)
            .enter()
            .append('g')
            .attr('class', 'bar-row')
            .attr('transform', d => `translate(0,${{y(d.tag)}})`)
            .on('mouseover', function(event, d) {{
                d3.select(this).select('rect').style('opacity', 0.8);
                showTooltip(event, d.tooltip.map(([k, v]) => `<b>${{k}}</b>: ${{escapeHtml(v)}}`).join('<br>'));
            }})
            .on('mouseout', function() {{
                d3.select(this).select('rect').style('opacity', 1);
                hideTooltip();
            }});

        rows.append('rect')
            .attr('class', d => d.accuracy === null ? 'bar bar-none' : 'bar')
            .attr('height', y.bandwidth())
            .attr('width', d => d.accuracy === null ? 0 : x(d.accuracy))
            .attr('rx', 3);

        rows.append('text')
            .attr('x', d => (d.accuracy === null ? 0 : x(d.accuracy)) + 6)
            .attr('y', y.bandwidth() / 2)
            .attr('dy', '0.35em')
            .attr('class', d => d.accuracy === null ? 'bar-label no-data' : 'bar-label')
            .text(d => d.accuracy_label);

        svg.append('g')
            .call(d3.axisLeft(y).tickSize(0))
            .style('color', '#7d8590')
            .select('.domain').remove();

        svg.append('g')
            .attr('transform', `translate(0,${{height}})`)
            .call(d3.axisBottom(x).ticks(5).tickFormat(d => d + '%'))
            .style('color', '#7d8590');
    }}

    // Initialize
    drawDonutChart();
    drawBarChart();
    </script>
</body>
</html>
"#,
        generated = generated,
        counters = counters,
        notice = notice,
        json_data = json_data,
    )?;

    Ok(())
}

fn write_head<W: Write>(writer: &mut W, title: &str, refresh_secs: Option<u32>) -> io::Result<()> {
    let refresh = refresh_secs
        .map(|s| format!(r#"<meta http-equiv="refresh" content="{}">"#, s))
        .unwrap_or_default();

    write!(writer, r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    {refresh}
    <title>{title}</title>
    <script src="https://d3js.org/d3.v7.min.js"></script>
    <style>
        :root {{
            --bg: #0d1117;
            --card: #161b22;
            --border: #30363d;
            --text: #e6edf3;
            --dim: #7d8590;
            --correct: #3fb950;
            --wrong: #f85149;
            --missed: #d29922;
            --accent: #58a6ff;
        }}
        * {{ box-sizing: border-box; margin: 0; padding: 0; }}
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', 'Noto Sans', Helvetica, Arial, sans-serif;
            background: var(--bg);
            color: var(--text);
            line-height: 1.5;
        }}
        .container {{ max-width: 1600px; margin: 0 auto; padding: 2rem; }}

        .header {{
            display: flex;
            align-items: baseline;
            gap: 1rem;
            margin-bottom: 2rem;
            padding-bottom: 1rem;
            border-bottom: 1px solid var(--border);
        }}
        .logo {{
            font-size: 2rem;
            font-weight: 800;
            background: linear-gradient(135deg, var(--accent), #a371f7);
            -webkit-background-clip: text;
            -webkit-text-fill-color: transparent;
        }}
        .subtitle {{ color: var(--dim); font-size: 1rem; }}

        .stats {{
            display: grid;
            grid-template-columns: repeat(6, 1fr);
            gap: 1rem;
            margin-bottom: 2rem;
        }}
        .stat {{
            background: var(--card);
            border: 1px solid var(--border);
            border-radius: 12px;
            padding: 1.25rem;
            text-align: center;
        }}
        .stat-value {{ font-size: 2.25rem; font-weight: 700; line-height: 1; }}
        .stat-label {{ color: var(--dim); font-size: 0.8rem; text-transform: uppercase; letter-spacing: 0.05em; margin-top: 0.5rem; }}

        .notice {{
            background: rgba(210,153,34,0.15);
            color: var(--missed);
            border-radius: 8px;
            padding: 0.75rem 1rem;
            margin-bottom: 2rem;
        }}

        .charts {{
            display: grid;
            grid-template-columns: 350px 1fr;
            gap: 1.5rem;
        }}
        .chart-card {{
            background: var(--card);
            border: 1px solid var(--border);
            border-radius: 12px;
            padding: 1.5rem;
        }}
        .chart-title {{
            font-size: 1rem;
            font-weight: 600;
            margin-bottom: 1rem;
            color: var(--dim);
        }}
        #donut-chart {{ display: flex; justify-content: center; }}
        #bar-chart {{ width: 100%; }}

        .donut-legend {{
            display: flex;
            justify-content: center;
            gap: 1.5rem;
            margin-top: 1rem;
            flex-wrap: wrap;
        }}
        .legend-item {{ display: flex; align-items: center; gap: 0.5rem; font-size: 0.875rem; }}
        .legend-dot {{ width: 12px; height: 12px; border-radius: 50%; }}

        .bar {{ fill: var(--accent); cursor: pointer; }}
        .bar-label {{ fill: var(--text); font-size: 0.8rem; }}
        .bar-label.no-data {{ fill: var(--dim); font-style: italic; }}

        .tooltip {{
            position: absolute;
            display: none;
            background: var(--card);
            border: 1px solid var(--border);
            border-radius: 6px;
            padding: 0.5rem 0.75rem;
            font-size: 0.8rem;
            pointer-events: none;
        }}

        .placeholder {{
            margin: 20vh auto 0;
            max-width: 560px;
            text-align: center;
        }}
        .placeholder-title {{ font-size: 1.5rem; font-weight: 700; color: var(--wrong); margin-bottom: 0.5rem; }}
        .placeholder-text {{ color: var(--dim); margin: 0.5rem 0; }}
        .reason {{
            background: var(--card);
            border: 1px solid var(--border);
            border-radius: 8px;
            padding: 0.75rem;
            text-align: left;
            white-space: pre-wrap;
            font-size: 0.8rem;
        }}
        .spinner {{
            width: 40px;
            height: 40px;
            margin: 0 auto 1rem;
            border: 4px solid var(--border);
            border-top-color: var(--accent);
            border-radius: 50%;
            animation: spin 0.8s linear infinite;
        }}
        @keyframes spin {{ to {{ transform: rotate(360deg); }} }}
    </style>
</head>
"#,
        refresh = refresh,
        title = html_escape(title),
    )
}

/// Serialize for embedding inside a `<script>` element
fn script_json(view: &ReportView) -> io::Result<String> {
    let json = serde_json::to_string(view)?;
    Ok(json.replace("</", "<\\/"))
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{EvaluationReport, TagStatistics, TotalStatistics};
    use crate::loader::LoadError;
    use std::sync::Arc;

    fn render_state(state: &LoadState) -> String {
        let mut buf = Vec::new();
        write_state(&mut buf, state, &PageOptions { refresh_secs: Some(2) }).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn scenario_report() -> EvaluationReport {
        let mut report = EvaluationReport {
            total_statistics: TotalStatistics {
                total_videos: 10,
                total_tags: 100,
                correct_tags: 80,
                wrong_tags: 15,
                missed_tags: 5,
            },
            ..Default::default()
        };
        report.tag_statistics.insert(
            "cat".to_string(),
            TagStatistics { total: 10, correct: 9, wrong: 1, missed: 0 },
        );
        report
    }

    // ==========================================================================
    // PAGE STATE TESTS
    // ==========================================================================
    //
    // The page must show exactly one of: loading placeholder, failure
    // message, or charts.
    // ==========================================================================

    #[test]
    fn test_loading_placeholder() {
        let html = render_state(&LoadState::NotLoaded);
        assert!(html.contains("Loading evaluation report"));
        assert!(html.contains(r#"http-equiv="refresh" content="2""#));
        assert!(!html.contains("drawDonutChart"));
    }

    #[test]
    fn test_failed_page_is_explicit() {
        let html = render_state(&LoadState::Failed(LoadError::Status(502)));
        assert!(html.contains("Could not load report"));
        assert!(html.contains("could not be reached"));
        assert!(!html.contains("Loading evaluation report"));
        assert!(!html.contains("http-equiv=\"refresh\""));
    }

    #[test]
    fn test_malformed_page_mentions_validity() {
        let err = LoadError::Malformed("missing section: <tag_statistics>".to_string());
        let html = render_state(&LoadState::Failed(err));
        assert!(html.contains("not a valid evaluation report"));
        assert!(html.contains("&lt;tag_statistics&gt;"), "reason must be escaped");
    }

    #[test]
    fn test_loaded_page_has_charts() {
        let html = render_state(&LoadState::Loaded(Arc::new(scenario_report())));
        assert!(html.contains("drawDonutChart();"));
        assert!(html.contains("drawBarChart();"));
        assert!(html.contains("Overall accuracy"));
        assert!(html.contains(r#""overall_accuracy_label":"80.0%""#));
        assert!(!html.contains("NaN"));
        assert!(!html.contains("No evaluated tags yet"));
    }

    #[test]
    fn test_hover_reads_embedded_rows() {
        let html = render_state(&LoadState::Loaded(Arc::new(scenario_report())));
        assert!(html.contains(
            r#""tooltip":[["Tag","cat"],["Accuracy","90.0%"],["Total","10"],["Correct","9"],["Wrong","1"],["Missed","0"]]"#
        ));
        assert!(html.contains("d.tooltip.map("));

        // Legend and slice hover use the display names
        assert!(html.contains(r#""name":"Correct""#));
        assert!(html.contains(r#""name":"Missed""#));
        assert!(html.contains("escapeHtml(d.data.name)"));
        assert!(!html.contains("d.data.type"));
    }

    #[test]
    fn test_summary_panel_has_six_counters() {
        let html = render_state(&LoadState::Loaded(Arc::new(scenario_report())));
        assert_eq!(html.matches(r#"<div class="stat">"#).count(), 6);
    }

    #[test]
    fn test_empty_report_shows_notice() {
        let html = render_state(&LoadState::Loaded(Arc::new(EvaluationReport::default())));
        assert!(html.contains("No evaluated tags yet"));
        assert!(html.contains(r#""overall_accuracy":null"#));
    }

    #[test]
    fn test_script_json_escapes_closing_tags() {
        let mut report = scenario_report();
        report
            .tag_statistics
            .insert("</script><b>".to_string(), TagStatistics::default());
        let json = script_json(&ReportView::from_report(&report)).unwrap();
        assert!(!json.contains("</script>"));
        assert!(json.contains(r#"<\/script>"#));
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }
}
