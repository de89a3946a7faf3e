// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Server-rendered dashboard
//!
//! The `.html` template name turns on minijinja's HTML auto-escaping, so
//! record text is never interpreted as markup. The page script listens on
//! `/ws` and reloads when a topic moves past the version it was rendered at.

use minijinja::{context, Environment};

use crate::context::AppContext;
use crate::Result;

const DASHBOARD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Dashboard - AZ Interface</title>
    <style>
        :root {
            --bg-primary: #1a1a2e;
            --bg-secondary: #16213e;
            --bg-card: #0f3460;
            --text-primary: #e8e8e8;
            --text-secondary: #a0a0a0;
            --accent: #e94560;
            --success: #00d9a5;
            --border: #2a2a4a;
        }
        * { box-sizing: border-box; margin: 0; padding: 0; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: var(--bg-primary);
            color: var(--text-primary);
            line-height: 1.6;
        }
        .container { max-width: 1400px; margin: 0 auto; padding: 20px; }
        nav {
            background: var(--bg-secondary);
            padding: 15px 20px;
            border-bottom: 1px solid var(--border);
            display: flex;
            justify-content: space-between;
        }
        nav .logo { font-size: 1.5em; font-weight: bold; color: var(--accent); }
        #live { color: var(--text-secondary); }
        .grid { display: grid; grid-template-columns: repeat(auto-fit, minmax(420px, 1fr)); gap: 20px; }
        .stats-grid { display: grid; grid-template-columns: repeat(auto-fit, minmax(160px, 1fr)); gap: 20px; margin: 20px 0; }
        .card, .stat-card { background: var(--bg-card); border-radius: 12px; padding: 20px; }
        .card h2 { margin-bottom: 15px; color: var(--accent); }
        .stat-card { text-align: center; }
        .stat-card .number { font-size: 2.5em; font-weight: bold; color: var(--accent); }
        .stat-card .label { color: var(--text-secondary); font-size: 0.9em; }
        table { width: 100%; border-collapse: collapse; }
        th, td { padding: 10px; text-align: left; border-bottom: 1px solid var(--border); }
        th { color: var(--text-secondary); font-weight: 500; }
        .badge { display: inline-block; border: 1px solid var(--border); padding: 2px 8px; border-radius: 6px; font-size: 0.85em; }
        .badge.new { border-color: var(--success); color: var(--success); }
        .muted { color: var(--text-secondary); }
    </style>
</head>
<body>
    <nav>
        <span class="logo">AZ Interface</span>
        <span id="live">offline</span>
    </nav>
    <main class="container">
        <div class="stats-grid">
            <div class="stat-card"><div class="number">{{ targets | length }}</div><div class="label">Targets</div></div>
            <div class="stat-card"><div class="number">{{ new_discoveries }}</div><div class="label">New discoveries</div></div>
            <div class="stat-card"><div class="number">{{ items | length }}</div><div class="label">Curated items</div></div>
            <div class="stat-card"><div class="number">{{ active_runs }}</div><div class="label">Active runs</div></div>
        </div>
        <div class="grid">
            <div class="card">
                <h2>Targets</h2>
                <table>
                    <tr><th>Title</th><th>Status</th><th>Tags</th></tr>
                    {% for target in targets %}
                    <tr>
                        <td><a href="{{ target.url }}" style="color: inherit">{{ target.title }}</a></td>
                        <td><span class="badge{% if target.isNewDiscovery %} new{% endif %}">{{ target.status }}</span></td>
                        <td class="muted">{{ target.tags | join(", ") }}</td>
                    </tr>
                    {% else %}
                    <tr><td colspan="3" class="muted">No targets yet</td></tr>
                    {% endfor %}
                </table>
            </div>
            <div class="card">
                <h2>Curated Items</h2>
                <table>
                    <tr><th>Title</th><th>Author</th><th>Category</th><th>Rating</th></tr>
                    {% for item in items %}
                    <tr>
                        <td>{{ item.title }}</td>
                        <td>{{ item.author }}</td>
                        <td><span class="badge">{{ item.category }}</span></td>
                        <td>{% if item.rating %}{{ item.rating }}/5{% else %}<span class="muted">-</span>{% endif %}</td>
                    </tr>
                    {% else %}
                    <tr><td colspan="4" class="muted">No items yet</td></tr>
                    {% endfor %}
                </table>
                <p class="muted" style="margin-top: 10px">
                    {% for name, count in categories %}{{ name }}: {{ count }}{% if not loop.last %} &middot; {% endif %}{% endfor %}
                </p>
            </div>
            <div class="card">
                <h2>Workflows</h2>
                <table>
                    <tr><th>Name</th><th>Trigger</th><th></th></tr>
                    {% for workflow in workflows %}
                    <tr>
                        <td>{{ workflow.name }}<div class="muted">{{ workflow.description }}</div></td>
                        <td>{{ workflow.trigger }}</td>
                        <td>{% if workflow.active %}<button data-run="{{ workflow.id }}">Run</button>{% else %}<span class="muted">inactive</span>{% endif %}</td>
                    </tr>
                    {% endfor %}
                </table>
            </div>
            <div class="card">
                <h2>Runs</h2>
                <table>
                    <tr><th>Workflow</th><th>Status</th><th>Progress</th><th>Message</th></tr>
                    {% for run in runs %}
                    <tr>
                        <td>{{ run.workflowId }}</td>
                        <td><span class="badge">{{ run.status }}</span></td>
                        <td>{{ run.progress }}%</td>
                        <td class="muted">{{ run.message or "" }}</td>
                    </tr>
                    {% else %}
                    <tr><td colspan="4" class="muted">No runs yet</td></tr>
                    {% endfor %}
                </table>
            </div>
        </div>
    </main>
    <script>
        const rendered = {{ versions | tojson }};
        const live = document.getElementById("live");
        const socket = new WebSocket(`ws://${location.host}/ws`);
        socket.onopen = () => { live.textContent = "live"; };
        socket.onclose = () => { live.textContent = "offline"; };
        socket.onmessage = (message) => {
            const event = JSON.parse(message.data);
            if (event.version > (rendered[event.topic] ?? -1)) {
                location.reload();
            }
        };
        document.querySelectorAll("button[data-run]").forEach((button) => {
            button.addEventListener("click", () => {
                fetch(`/api/workflows/${button.dataset.run}/run`, { method: "POST" });
            });
        });
    </script>
</body>
</html>
"#;

/// Render the dashboard from the current snapshots
pub fn render_dashboard(app: &AppContext) -> Result<String> {
    let targets = app.targets.list();
    let items = app.items.list();
    let runs = app.workflows.list_runs();

    let new_discoveries = targets.iter().filter(|t| t.is_new_discovery).count();
    let active_runs = runs.iter().filter(|r| !r.status.is_terminal()).count();
    let versions: std::collections::BTreeMap<&str, u64> = [
        (app.targets.store().topic().as_str(), targets.version),
        (app.items.store().topic().as_str(), items.version),
        (app.workflows.store().topic().as_str(), runs.version),
    ]
    .into_iter()
    .collect();

    let mut env = Environment::new();
    env.add_template("dashboard.html", DASHBOARD)?;
    let template = env.get_template("dashboard.html")?;

    let html = template.render(context! {
        targets => targets.records(),
        items => items.records(),
        runs => runs.records(),
        workflows => app.workflows.list_workflows(),
        categories => app.items.category_stats(),
        new_discoveries,
        active_runs,
        versions,
    })?;
    Ok(html)
}
