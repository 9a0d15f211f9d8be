use form_ast::{compile, AstNodeKind};
use serde_json::json;

#[test]
fn validation_wiring_threads_condition_and_message_back_to_the_block() {
    let doc = json!({
        "type": "journey", "code": "x", "title": "X",
        "steps": [{
            "type": "step", "path": "/a", "title": "A",
            "blocks": [{
                "type": "block", "variant": "text", "blockType": "field", "code": "email",
                "validate": [{
                    "type": "Validation",
                    "condition": {
                        "LogicType": "Test",
                        "subject": { "type": "Reference", "path": ["answers", "email"] },
                        "condition": { "type": "Function", "name": "isEmail", "FunctionType": "Condition", "arguments": [] },
                    },
                    "message": "Enter a valid email",
                }],
            }],
        }],
    });

    let output = compile(&doc).expect("compiles");
    let block_id = output
        .registry
        .ids()
        .find(|id| matches!(output.registry.get(*id).unwrap().kind, AstNodeKind::Block(_)))
        .unwrap();
    let validation_id = output
        .registry
        .ids()
        .find(|id| matches!(output.registry.get(*id).unwrap().kind, AstNodeKind::Validation(_)))
        .unwrap();

    assert!(output.graph.edges().iter().any(|e| e.from == validation_id && e.to == block_id));
    assert!(output.graph.predecessors(block_id).any(|p| p == validation_id));
}

#[test]
fn duplicate_answer_references_coalesce_to_one_pseudo_node() {
    let doc = json!({
        "type": "journey", "code": "x", "title": "X",
        "steps": [{
            "type": "step", "path": "/a", "title": "A",
            "blocks": [
                {
                    "type": "block", "variant": "text", "blockType": "field", "code": "a",
                    "defaultValue": { "type": "Reference", "path": ["answers", "sharedKey"] },
                },
                {
                    "type": "block", "variant": "text", "blockType": "field", "code": "b",
                    "defaultValue": { "type": "Reference", "path": ["answers", "sharedKey"] },
                },
            ],
        }],
    });

    let output = compile(&doc).expect("compiles");
    assert_eq!(output.pseudo.len(), 1);

    let pseudo_id = output.pseudo.ids().next().unwrap();
    let fan_out = output.graph.edges().iter().filter(|e| e.from == pseudo_id).count();
    assert_eq!(fan_out, 2);
}

#[test]
fn acyclic_by_construction_since_the_compiler_never_shares_structure() {
    let doc = json!({
        "type": "journey", "code": "x", "title": "X",
        "steps": [{
            "type": "step", "path": "/a", "title": "A",
            "blocks": [{ "type": "block", "variant": "text", "blockType": "field", "code": "a" }],
        }],
    });
    let output = compile(&doc).expect("compiles");
    for id in output.registry.ids() {
        assert!(output.graph.is_acyclic(id));
    }
}
