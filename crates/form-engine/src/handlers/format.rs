use crate::context::EvaluationContext;
use crate::invoker::eval_voln;
use crate::memo::EvalResult;
use form_ast::{FormatNode, NodeId};
use serde_json::Value;

/// `%1…%N` substitution into `template`. Arguments are evaluated left to
/// right (the scheduling model permits parallelism here since results aren't
/// ordering-sensitive, but evaluation is single-threaded cooperative so
/// sequential is equivalent); unused arguments are dropped and missing
/// positions become the empty string.
pub async fn eval(ctx: &mut EvaluationContext<'_>, _node: NodeId, format: &FormatNode) -> EvalResult {
    let mut values = Vec::with_capacity(format.arguments.len());
    for arg in &format.arguments {
        values.push(eval_voln(ctx, arg).await?);
    }

    let chars: Vec<char> = format.template.chars().collect();
    let mut output = String::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '%' && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()) {
            let mut j = i + 1;
            let mut digits = String::new();
            while j < chars.len() && chars[j].is_ascii_digit() {
                digits.push(chars[j]);
                j += 1;
            }
            if let Ok(n) = digits.parse::<usize>() {
                if n >= 1 {
                    if let Some(v) = values.get(n - 1) {
                        output.push_str(&display(v));
                    }
                }
            }
            i = j;
        } else {
            output.push(chars[i]);
            i += 1;
        }
    }
    Ok(Value::String(output))
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
