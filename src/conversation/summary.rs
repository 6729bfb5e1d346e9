//! Plan summary rendering for chat replies.

use crate::collaborators::plans::{Meal, Meals};

/// Bullet lines shown per meal before silently truncating.
const MAX_ITEM_LINES: usize = 6;

/// Render a day's plan: one line per slot, fixed order.
pub fn summarize_plan(date: &str, meals: &Meals) -> String {
    format!(
        "*Today ({date})*\n{}\n{}\n{}",
        fmt_meal("Breakfast", meals.breakfast.as_ref()),
        fmt_meal("Lunch", meals.lunch.as_ref()),
        fmt_meal("Supper", meals.dinner.as_ref()),
    )
}

fn fmt_meal(name: &str, meal: Option<&Meal>) -> String {
    let Some(meal) = meal else {
        return format!("• {name}: —");
    };

    let label = meal.label.as_deref().unwrap_or("—");
    let energy = meal
        .calories
        .map(|kcal| format!(" ({} kcal)", kcal.round() as i64))
        .unwrap_or_default();
    let items: String = meal
        .items
        .iter()
        .take(MAX_ITEM_LINES)
        .map(|item| format!("\n   · {item}"))
        .collect();

    format!("• {name}: {label}{energy}{items}")
}
