use plotly::layout::{Axis, Layout};
use plotly::{Bar, Plot};

use crate::importance::NamedScores;

/// Horizontal bar chart of feature importances, largest on top.
pub fn plot_feature_importances(importances: &NamedScores, title: &str) -> Plot {
    let sorted = importances.sorted_desc();
    // Plotly draws the first category at the bottom of a horizontal bar chart.
    let names: Vec<String> = sorted.names().rev().map(str::to_string).collect();
    let values: Vec<f64> = sorted.entries().iter().rev().map(|(_, v)| *v).collect();

    let trace = Bar::new(values, names)
        .orientation(plotly::common::Orientation::Horizontal)
        .name("Importance");

    let layout = Layout::new()
        .title(title)
        .x_axis(Axis::new().title("Importance"))
        .y_axis(Axis::new().title("Feature"));

    let mut plot = Plot::new();
    plot.add_trace(trace);
    plot.set_layout(layout);
    plot
}

