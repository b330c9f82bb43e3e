use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};

use crate::{
    core::forecast::GenerationForecast,
    quantity::{energy::WattHours, power::Watts},
};

#[must_use]
pub fn build_forecast_table(
    forecast: &GenerationForecast,
    load: Watts,
    max_charge_rate: Watts,
) -> Table {
    let grid_neutral_time = forecast.grid_neutral_time(load);

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .enforce_styling();
    table.set_header(vec!["Date", "Hour", "Generation", "Surplus"]);
    for (hour, generation) in forecast.iter() {
        let surplus = WattHours((generation.0 - load.0).clamp(0.0, max_charge_rate.0));
        let mut hour_cell = Cell::new(hour.format("%H:%M"));
        if Some(hour) == grid_neutral_time {
            hour_cell = hour_cell.add_attribute(Attribute::Bold).fg(Color::Green);
        }
        table.add_row(vec![
            Cell::new(hour.format("%b %d")).add_attribute(Attribute::Dim),
            hour_cell,
            Cell::new(format!("{generation:.0}")).set_alignment(CellAlignment::Right),
            Cell::new(format!("{surplus:.0}")).set_alignment(CellAlignment::Right).fg(
                if surplus > WattHours::ZERO { Color::Green } else { Color::Reset },
            ),
        ]);
    }
    table
}
