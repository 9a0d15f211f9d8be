use crate::context::EvaluationContext;
use crate::error::{ErrorKind, EvalError};
use crate::handlers::is_truthy;
use crate::invoker::{eval_voln, invoke};
use crate::memo::EvalResult;
use crate::scope::ScopeFrame;
use form_ast::{IterateMode, IterateNode, NodeId, ValueOrNode};
use serde_json::{Map, Value};

/// Normalizes `input`, pushes a per-item scope frame (`@index`, `@item`,
/// `@type: iterator`, plus the item's own fields when it's an object) for
/// each surviving entry, and evaluates the yield template (MAP) or predicate
/// (FILTER/FIND) under that frame.
///
/// The compiled yield/predicate subtree is a single shared template; each
/// item gets its own freshly minted clone of it (via
/// [`form_ast::clone_runtime_subtree`]) before evaluation, so two items never
/// alias the same runtime node id and each clone's memoized result is its
/// own. `extend_with_runtime` is the composite/dynamic-field-code path;
/// this one only ever clones an already-compiled subtree.
pub async fn eval(ctx: &mut EvaluationContext<'_>, node: NodeId, it: &IterateNode) -> EvalResult {
    let input = eval_voln(ctx, &it.input).await?;
    let entries = normalize_input(&input, node)?;
    if entries.len() > ctx.config.max_iteration_items {
        return Err(EvalError::at(
            ErrorKind::EvaluationFailed,
            node,
            format!("ITERATE input has {} items, exceeding the configured maximum of {}", entries.len(), ctx.config.max_iteration_items),
        ));
    }

    if entries.is_empty() {
        return Ok(match it.mode {
            IterateMode::Find => Value::Null,
            IterateMode::Map | IterateMode::Filter => Value::Array(Vec::new()),
        });
    }

    let mut mapped = Vec::new();
    let mut filtered = Vec::new();

    for (index, raw) in entries.into_iter().enumerate() {
        if raw.is_null() {
            continue;
        }
        ctx.scope.push(ScopeFrame::iterator_item(index, raw.clone(), None));
        let outcome = evaluate_item(ctx, node, it, index).await;
        ctx.scope.pop();
        let value = outcome?;

        match it.mode {
            IterateMode::Map => mapped.push(value),
            IterateMode::Filter => {
                if is_truthy(&value) {
                    filtered.push(raw);
                }
            }
            IterateMode::Find => {
                if is_truthy(&value) {
                    return Ok(raw);
                }
            }
        }
    }

    Ok(match it.mode {
        IterateMode::Map => Value::Array(mapped),
        IterateMode::Filter => Value::Array(filtered),
        IterateMode::Find => Value::Null,
    })
}

async fn evaluate_item(ctx: &mut EvaluationContext<'_>, node: NodeId, it: &IterateNode, index: usize) -> EvalResult {
    match it.mode {
        IterateMode::Map => match &it.yield_template {
            Some(ValueOrNode::Literal(literal)) => Ok(literal.to_json()),
            Some(ValueOrNode::Node(template_id)) => {
                let item_node = clone_for_item(ctx, node, *template_id, "yield", index)?;
                invoke(ctx, item_node).await
            }
            None => Ok(ctx.scope.lookup(crate::scope::KEY_ITEM).cloned().unwrap_or(Value::Null)),
        },
        IterateMode::Filter | IterateMode::Find => match it.predicate {
            Some(predicate) => {
                let item_node = clone_for_item(ctx, node, predicate, "predicate", index)?;
                invoke(ctx, item_node).await
            }
            None => Ok(Value::Bool(true)),
        },
    }
}

/// Materializes one item's copy of a `yield`/`predicate` template by cloning
/// it into fresh runtime nodes under the `ITERATE` node itself.
fn clone_for_item(
    ctx: &mut EvaluationContext<'_>,
    node: NodeId,
    template: NodeId,
    property: &'static str,
    index: usize,
) -> Result<NodeId, EvalError> {
    form_ast::clone_runtime_subtree(&mut ctx.state, template, node, property, Some(index))
        .map_err(|e| EvalError::at(ErrorKind::EvaluationFailed, node, format!("failed to materialize {property} for item {index}: {e}")))
}

fn normalize_input(input: &Value, node: NodeId) -> Result<Vec<Value>, EvalError> {
    match input {
        Value::Array(items) => Ok(items.clone()),
        Value::Object(map) => Ok(map
            .iter()
            .map(|(k, v)| {
                let mut entry = Map::new();
                entry.insert("@key".to_string(), Value::String(k.clone()));
                match v {
                    Value::Object(inner) => {
                        for (ik, iv) in inner {
                            entry.insert(ik.clone(), iv.clone());
                        }
                    }
                    other => {
                        entry.insert("@value".to_string(), other.clone());
                    }
                }
                Value::Object(entry)
            })
            .collect()),
        _ => Err(EvalError::at(ErrorKind::TypeMismatch, node, "ITERATE input must be an array or object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use form_ast::ValueOrNode;

    fn sample_context() -> (form_ast::CompileOutput, crate::registries::FunctionRegistries) {
        let output = form_ast::compile(&serde_json::json!({
            "type": "journey", "code": "a", "title": "A",
            "steps": [{ "type": "step", "path": "/s", "title": "S", "blocks": [] }],
        }))
        .unwrap();
        (output, crate::registries::FunctionRegistries::new())
    }

    #[tokio::test]
    async fn empty_array_input_maps_to_empty_array() {
        let (output, functions) = sample_context();
        let mut ctx = EvaluationContext::new(&output, &functions, crate::request::RequestShell::new("/s"));
        let it = IterateNode {
            input: ValueOrNode::Literal(form_ast::Literal::Array(vec![])),
            mode: IterateMode::Map,
            yield_template: None,
            predicate: None,
        };
        let result = eval(&mut ctx, NodeId::new(form_ast::NodeCategory::RuntimeAst, 0), &it).await.unwrap();
        assert_eq!(result, Value::Array(Vec::new()));
    }

    #[tokio::test]
    async fn empty_input_for_find_is_undefined() {
        let (output, functions) = sample_context();
        let mut ctx = EvaluationContext::new(&output, &functions, crate::request::RequestShell::new("/s"));
        let it = IterateNode {
            input: ValueOrNode::Literal(form_ast::Literal::Array(vec![])),
            mode: IterateMode::Find,
            yield_template: None,
            predicate: None,
        };
        let result = eval(&mut ctx, NodeId::new(form_ast::NodeCategory::RuntimeAst, 0), &it).await.unwrap();
        assert_eq!(result, Value::Null);
    }

    #[tokio::test]
    async fn map_with_no_yield_template_passes_items_through() {
        let (output, functions) = sample_context();
        let mut ctx = EvaluationContext::new(&output, &functions, crate::request::RequestShell::new("/s"));
        let it = IterateNode {
            input: ValueOrNode::Literal(form_ast::Literal::Array(vec![
                form_ast::Literal::Number(1.0),
                form_ast::Literal::Number(2.0),
            ])),
            mode: IterateMode::Map,
            yield_template: None,
            predicate: None,
        };
        let result = eval(&mut ctx, NodeId::new(form_ast::NodeCategory::RuntimeAst, 0), &it).await.unwrap();
        assert_eq!(result, Value::Array(vec![Value::from(1.0), Value::from(2.0)]));
    }

    #[tokio::test]
    async fn scalar_input_is_a_type_mismatch() {
        let (output, functions) = sample_context();
        let mut ctx = EvaluationContext::new(&output, &functions, crate::request::RequestShell::new("/s"));
        let it = IterateNode {
            input: ValueOrNode::Literal(form_ast::Literal::Number(5.0)),
            mode: IterateMode::Map,
            yield_template: None,
            predicate: None,
        };
        let err = eval(&mut ctx, NodeId::new(form_ast::NodeCategory::RuntimeAst, 0), &it).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[tokio::test]
    async fn map_with_a_node_yield_template_clones_a_fresh_node_per_item() {
        let output = form_ast::compile(&serde_json::json!({
            "type": "journey", "code": "a", "title": "A",
            "steps": [{
                "type": "step", "path": "/s", "title": "S",
                "blocks": [{
                    "type": "block", "variant": "text", "blockType": "field", "code": "items",
                    "defaultValue": {
                        "type": "Iterate",
                        "input": ["x", "y"],
                        "mode": "map",
                        "yield": { "type": "Format", "template": "item", "arguments": [] },
                    },
                }],
            }],
        }))
        .unwrap();
        let functions = crate::registries::FunctionRegistries::new();
        let mut ctx = EvaluationContext::new(&output, &functions, crate::request::RequestShell::new("/s"));

        let iterate_id = ctx
            .state
            .registry
            .ids()
            .find(|id| matches!(ctx.state.registry.get(*id).unwrap().kind, form_ast::AstNodeKind::Iterate(_)))
            .unwrap();
        let form_ast::AstNodeKind::Iterate(it) = ctx.state.registry.get(iterate_id).unwrap().kind.clone() else {
            unreachable!()
        };

        let nodes_before = ctx.state.registry.len();
        let result = eval(&mut ctx, iterate_id, &it).await.unwrap();
        assert_eq!(result, Value::Array(vec![Value::from("item"), Value::from("item")]));
        // One freshly minted Format clone per item, distinct from the shared template.
        assert_eq!(ctx.state.registry.len(), nodes_before + 2);
    }
}
