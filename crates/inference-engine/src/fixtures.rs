//! Tiny ONNX graphs shaped like the trained artifacts, for tests
//!
//! Encoded with the protobuf types tract-onnx parses, so every slot of the
//! trained load path can run without shipping real weights.
//!
//! - `leaf_cnn`: mean of each RGB channel, a 3x4 dense layer, softmax. A solid
//!   red, green or blue image is classified as brown spots, healthy or leaf
//!   smut; an all-zero image leans to bacterial leaf blight through the bias.
//! - `field_scaler`: `(x - mean) / scale` with fixed per-feature parameters.
//! - `field_forest`: two stumps over scaled temperature (feature 2) and
//!   relative humidity (feature 5), summing to `[P(Bad), P(Good)]`.

use prost::Message;
use std::path::Path;
use tract_onnx::pb::{
    attribute_proto::AttributeType, tensor_proto::DataType, tensor_shape_proto, type_proto,
    AttributeProto, GraphProto, ModelProto, NodeProto, OperatorSetIdProto, TensorProto,
    TensorShapeProto, TypeProto, ValueInfoProto,
};

/// Scaler mean per feature, in reading order
pub const SCALER_MEAN: [f32; 6] = [32.0, 22.0, 27.0, 5.0, 6.5, 75.0];
/// Scaler standard deviation per feature
pub const SCALER_SCALE: [f32; 6] = [3.0, 2.0, 2.5, 4.0, 0.5, 10.0];

/// Write the three graphs under the default artifact names
pub fn write_models(dir: &Path) -> std::io::Result<()> {
    std::fs::write(dir.join("cnn_model.onnx"), leaf_cnn())?;
    std::fs::write(dir.join("rf_model.onnx"), field_forest())?;
    std::fs::write(dir.join("scaler.onnx"), field_scaler())?;
    Ok(())
}

pub fn leaf_cnn() -> Vec<u8> {
    #[rustfmt::skip]
    let weights = [
        0.0, 4.0, 0.0, 0.0,
        0.0, 0.0, 4.0, 0.0,
        0.0, 0.0, 0.0, 4.0,
    ];

    let graph = GraphProto {
        name: "leaf_cnn".into(),
        node: vec![
            node(
                "ReduceMean",
                &["input"],
                &["channel_mean"],
                vec![ints("axes", &[1, 2]), int("keepdims", 0)],
            ),
            node("MatMul", &["channel_mean", "dense_w"], &["dense"], vec![]),
            node("Add", &["dense", "dense_b"], &["logits"], vec![]),
            node("Softmax", &["logits"], &["probabilities"], vec![int("axis", 1)]),
        ],
        initializer: vec![
            floats_tensor("dense_w", &[3, 4], &weights),
            floats_tensor("dense_b", &[4], &[0.1, 0.0, 0.0, 0.0]),
        ],
        input: vec![f32_value("input", &[1, 128, 128, 3])],
        output: vec![f32_value("probabilities", &[1, 4])],
        ..Default::default()
    };
    encode(graph)
}

pub fn field_scaler() -> Vec<u8> {
    let graph = GraphProto {
        name: "field_scaler".into(),
        node: vec![
            node("Sub", &["input", "mean"], &["centered"], vec![]),
            node("Div", &["centered", "scale"], &["variable"], vec![]),
        ],
        initializer: vec![
            floats_tensor("mean", &[6], &SCALER_MEAN),
            floats_tensor("scale", &[6], &SCALER_SCALE),
        ],
        input: vec![f32_value("input", &[1, 6])],
        output: vec![f32_value("variable", &[1, 6])],
        ..Default::default()
    };
    encode(graph)
}

pub fn field_forest() -> Vec<u8> {
    let attributes = vec![
        ints("nodes_treeids", &[0, 0, 0, 1, 1, 1]),
        ints("nodes_nodeids", &[0, 1, 2, 0, 1, 2]),
        ints("nodes_featureids", &[2, 0, 0, 5, 0, 0]),
        floats("nodes_values", &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0]),
        strings(
            "nodes_modes",
            &["BRANCH_LEQ", "LEAF", "LEAF", "BRANCH_LEQ", "LEAF", "LEAF"],
        ),
        ints("nodes_truenodeids", &[1, 0, 0, 1, 0, 0]),
        ints("nodes_falsenodeids", &[2, 0, 0, 2, 0, 0]),
        ints("class_treeids", &[0, 0, 0, 0, 1, 1, 1, 1]),
        ints("class_nodeids", &[1, 1, 2, 2, 1, 1, 2, 2]),
        ints("class_ids", &[0, 1, 0, 1, 0, 1, 0, 1]),
        floats("class_weights", &[0.0, 0.5, 0.5, 0.0, 0.1, 0.4, 0.4, 0.1]),
        ints("classlabels_int64s", &[0, 1]),
        string("post_transform", "NONE"),
    ];

    let mut classifier = node(
        "TreeEnsembleClassifier",
        &["input"],
        &["label", "probabilities"],
        attributes,
    );
    classifier.domain = "ai.onnx.ml".into();

    let graph = GraphProto {
        name: "field_forest".into(),
        node: vec![classifier],
        input: vec![f32_value("input", &[1, 6])],
        output: vec![
            value("label", DataType::Int64, &[1]),
            f32_value("probabilities", &[1, 2]),
        ],
        ..Default::default()
    };
    encode(graph)
}

fn encode(graph: GraphProto) -> Vec<u8> {
    let model = ModelProto {
        ir_version: 7,
        producer_name: "rice-disease-fixtures".into(),
        opset_import: vec![
            OperatorSetIdProto {
                domain: String::new(),
                version: 13,
            },
            OperatorSetIdProto {
                domain: "ai.onnx.ml".into(),
                version: 1,
            },
        ],
        graph: Some(graph),
        ..Default::default()
    };
    model.encode_to_vec()
}

fn node(op: &str, inputs: &[&str], outputs: &[&str], attribute: Vec<AttributeProto>) -> NodeProto {
    NodeProto {
        name: format!("{}_{}", op, outputs[0]),
        op_type: op.into(),
        input: inputs.iter().map(|s| s.to_string()).collect(),
        output: outputs.iter().map(|s| s.to_string()).collect(),
        attribute,
        ..Default::default()
    }
}

fn attribute(name: &str, kind: AttributeType) -> AttributeProto {
    AttributeProto {
        name: name.into(),
        r#type: kind as i32,
        ..Default::default()
    }
}

fn int(name: &str, value: i64) -> AttributeProto {
    AttributeProto {
        i: value,
        ..attribute(name, AttributeType::Int)
    }
}

fn ints(name: &str, values: &[i64]) -> AttributeProto {
    AttributeProto {
        ints: values.to_vec(),
        ..attribute(name, AttributeType::Ints)
    }
}

fn floats(name: &str, values: &[f32]) -> AttributeProto {
    AttributeProto {
        floats: values.to_vec(),
        ..attribute(name, AttributeType::Floats)
    }
}

fn string(name: &str, value: &str) -> AttributeProto {
    AttributeProto {
        s: value.as_bytes().to_vec(),
        ..attribute(name, AttributeType::String)
    }
}

fn strings(name: &str, values: &[&str]) -> AttributeProto {
    AttributeProto {
        strings: values.iter().map(|s| s.as_bytes().to_vec()).collect(),
        ..attribute(name, AttributeType::Strings)
    }
}

fn floats_tensor(name: &str, dims: &[i64], values: &[f32]) -> TensorProto {
    TensorProto {
        name: name.into(),
        dims: dims.to_vec(),
        data_type: DataType::Float as i32,
        float_data: values.to_vec(),
        ..Default::default()
    }
}

fn f32_value(name: &str, dims: &[i64]) -> ValueInfoProto {
    value(name, DataType::Float, dims)
}

fn value(name: &str, elem_type: DataType, dims: &[i64]) -> ValueInfoProto {
    let dim = dims
        .iter()
        .map(|&d| tensor_shape_proto::Dimension {
            value: Some(tensor_shape_proto::dimension::Value::DimValue(d)),
            ..Default::default()
        })
        .collect();

    ValueInfoProto {
        name: name.into(),
        r#type: Some(TypeProto {
            value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                elem_type: elem_type as i32,
                shape: Some(TensorShapeProto { dim }),
            })),
            ..Default::default()
        }),
        ..Default::default()
    }
}
