use form_ast::{compile, AstNodeKind, CompileError};
use serde_json::json;

fn sample_journey() -> serde_json::Value {
    json!({
        "type": "journey",
        "code": "mortgage-application",
        "title": "Mortgage Application",
        "pathPrefix": "/apply",
        "steps": [
            {
                "type": "step",
                "path": "/personal-details",
                "title": "Personal details",
                "blocks": [
                    {
                        "type": "block",
                        "variant": "text",
                        "blockType": "field",
                        "code": "firstName",
                        "validate": [
                            {
                                "type": "Validation",
                                "condition": {
                                    "LogicType": "Test",
                                    "subject": { "type": "Reference", "path": ["answers", "firstName"] },
                                    "condition": { "type": "Function", "name": "isNonEmpty", "FunctionType": "Condition", "arguments": [] },
                                },
                                "message": "First name is required",
                            },
                        ],
                    },
                    {
                        "type": "block",
                        "variant": "number",
                        "blockType": "field",
                        "code": "annualIncome",
                        "defaultValue": {
                            "type": "Conditional",
                            "predicate": {
                                "LogicType": "Test",
                                "subject": { "type": "Reference", "path": ["answers", "employmentType"] },
                                "condition": { "type": "Function", "name": "equals", "FunctionType": "Condition", "arguments": ["salaried"] },
                            },
                            "then": 0,
                            "else": null,
                        },
                    },
                ],
                "onSubmission": [
                    {
                        "TransitionType": "Submit",
                        "validate": true,
                        "onValid": {
                            "effects": [],
                            "next": { "type": "Next", "goto": "/review" },
                        },
                        "onInvalid": { "effects": [] },
                        "onAlways": [],
                    },
                ],
            },
        ],
    })
}

#[test]
fn compiles_a_realistic_journey_end_to_end() {
    let output = compile(&sample_journey()).expect("journey compiles");

    let step_count = output
        .registry
        .ids()
        .filter(|id| matches!(output.registry.get(*id).unwrap().kind, AstNodeKind::Step(_)))
        .count();
    assert_eq!(step_count, 1);

    let reference_count = output
        .registry
        .ids()
        .filter(|id| matches!(output.registry.get(*id).unwrap().kind, AstNodeKind::Reference(_)))
        .count();
    assert_eq!(reference_count, 2);

    // firstName and employmentType pseudo answers, coalesced one each.
    assert_eq!(output.pseudo.len(), 2);
    assert!(output.graph.is_acyclic(output.root));
}

#[test]
fn unknown_discriminator_is_reported_with_its_path() {
    let doc = json!({
        "type": "journey", "code": "x", "title": "X",
        "steps": [{
            "type": "step", "path": "/a", "title": "A",
            "blocks": [{
                "type": "block", "variant": "text", "blockType": "field", "code": "y",
                "defaultValue": { "type": "not-a-real-kind" },
            }],
        }],
    });
    let err = compile(&doc).unwrap_err();
    assert!(matches!(err, CompileError::UnknownDiscriminator { .. }));
}

#[test]
fn topological_order_from_a_pseudo_source_precedes_its_dependents() {
    let output = compile(&sample_journey()).expect("journey compiles");

    let pseudo_id = output.pseudo.ids().next().expect("at least one pseudo node");
    let order = output.graph.topological_order(pseudo_id).expect("acyclic");
    let position = |id| order.iter().position(|&n| n == id).unwrap();

    for edge in output.graph.edges().iter().filter(|e| order.contains(&e.from) && order.contains(&e.to)) {
        assert!(position(edge.from) <= position(edge.to));
    }
}
