use std::fs;
use std::path::Path;

use log::info;
use maud::{html, PreEscaped, DOCTYPE};

use crate::error::Result;
use crate::importance::{self, NamedScores};
use crate::pipeline::FittedModel;
use crate::report::plots::plot_feature_importances;

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.27.0.min.js";

/// Render a standalone HTML page with the model summary and its importances.
pub fn render_importance_report(model: &FittedModel, title: &str) -> Result<String> {
    let importances = importance::report(&model.pipeline)?;
    let chart = plot_feature_importances(&importances, "Feature importance")
        .to_inline_html(Some("feature-importance"));
    let encoder = model.pipeline.encoder();
    let sorted: NamedScores = importances.sorted_desc();

    let page = html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                title { (title) }
                script src=(PLOTLY_CDN) {}
            }
            body {
                h1 { (title) }
                section {
                    h2 { "Model" }
                    ul {
                        li { "Classes: " (model.codec.classes().join(", ")) }
                        li { "Encoded features: " (encoder.num_features()) }
                        li { "Boosting rounds: " (model.pipeline.classifier().num_rounds()) }
                        @for column in encoder.categorical_columns() {
                            li {
                                (column.name) " vocabulary: "
                                (column.vocabulary.categories().join(", "))
                            }
                        }
                    }
                }
                section {
                    h2 { "Feature importance" }
                    (PreEscaped(chart))
                    table {
                        thead { tr { th { "Feature" } th { "Importance" } } }
                        tbody {
                            @for (name, value) in sorted.entries() {
                                tr { td { (name) } td { (format!("{:.4}", value)) } }
                            }
                        }
                    }
                }
            }
        }
    };
    Ok(page.into_string())
}

pub fn write_importance_report<P: AsRef<Path>>(
    model: &FittedModel,
    path: P,
    title: &str,
) -> Result<()> {
    let html = render_importance_report(model, title)?;
    fs::write(path.as_ref(), html)?;
    info!("Wrote importance report to {}", path.as_ref().display());
    Ok(())
}
