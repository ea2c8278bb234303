use tensorlink::client::{TensorSource, TransferClient};
use tensorlink::device::{Device, DeviceKind};
use tensorlink::error::Result;
use tensorlink::layout::LayoutPolicy;
use tensorlink::literal::Literal;
use tensorlink::marshal::{
    create_tensors_data, get_tensor_literal, make_tensor_from_literal, shape_for_device,
    tensor_to_device_data, tensor_to_device_data_with_shape,
};
use tensorlink::shape::{ElementType, Shape};
use tensorlink::tensor::{HostArray, HostTensor, ScalarKind};
use tensorlink_backend_ref_cpu::CpuClient;

#[test]
fn f32_literals_round_trip() {
    let tensor = HostTensor::from_vec(&[2, 2], vec![1.0f32, 2.0, 3.0, 4.0]);
    let literal = get_tensor_literal(&tensor, None);
    assert_eq!(literal.shape().element_type(), ElementType::F32);
    assert_eq!(literal.shape().dims(), &[2, 2]);
    assert_eq!(literal.byte_len(), 16);

    let back: HostTensor = make_tensor_from_literal(&literal);
    assert_eq!(back.dims(), vec![2, 2]);
    assert_eq!(back.data::<f32>(), tensor.data::<f32>());
}

#[test]
fn integer_literals_round_trip() {
    let bytes = HostTensor::from_vec(&[3], vec![1u8, 128, 255]);
    let back: HostTensor = make_tensor_from_literal(&get_tensor_literal(&bytes, None));
    assert_eq!(back.scalar_kind(), ScalarKind::U8);
    assert_eq!(back.data::<u8>(), &[1, 128, 255]);

    let longs = HostTensor::from_vec(&[2], vec![i64::MIN, i64::MAX]);
    let back: HostTensor = make_tensor_from_literal(&get_tensor_literal(&longs, None));
    assert_eq!(back.scalar_kind(), ScalarKind::I64);
    assert_eq!(back.data::<i64>(), &[i64::MIN, i64::MAX]);

    let shorts = HostTensor::from_vec(&[2, 2], vec![-1i16, 2, -3, 4]);
    let back: HostTensor = make_tensor_from_literal(&get_tensor_literal(&shorts, None));
    assert_eq!(back.data::<i16>(), &[-1, 2, -3, 4]);

    let chars = HostTensor::from_vec(&[4], vec![-128i8, -1, 0, 127]);
    let back: HostTensor = make_tensor_from_literal(&get_tensor_literal(&chars, None));
    assert_eq!(back.scalar_kind(), ScalarKind::I8);
    assert_eq!(back.data::<i8>(), &[-128, -1, 0, 127]);

    let ints = HostTensor::from_vec(&[3], vec![i32::MIN, 7, i32::MAX]);
    let back: HostTensor = make_tensor_from_literal(&get_tensor_literal(&ints, None));
    assert_eq!(back.scalar_kind(), ScalarKind::I32);
    assert_eq!(back.data::<i32>(), &[i32::MIN, 7, i32::MAX]);
}

#[test]
fn bf16_literals_promote_to_f32_tensors() {
    let tensor = HostTensor::from_vec(&[3], vec![1.5f32, -2.25, 0.15625]);
    let shape = Shape::with_descending_layout(ElementType::Bf16, &[3]);
    let literal = get_tensor_literal(&tensor, Some(&shape));
    assert_eq!(literal.byte_len(), 6);

    let back: HostTensor = make_tensor_from_literal(&literal);
    assert_eq!(back.scalar_kind(), ScalarKind::F32);
    assert_eq!(back.data::<f32>(), &[1.5, -2.25, 0.15625]);
}

#[test]
fn populate_respects_destination_layout() {
    let tensor = HostTensor::from_vec(&[2, 2], vec![1.0f32, 2.0, 3.0, 4.0]);
    let dest_shape = Shape::with_layout(ElementType::F32, &[2, 2], &[0, 1]);
    let literal = get_tensor_literal(&tensor, Some(&dest_shape));

    // Column-major payload.
    let expected = HostTensor::from_vec(&[4], vec![1.0f32, 3.0, 2.0, 4.0]);
    assert_eq!(literal.bytes(), expected.contiguous_bytes().as_ref());

    // Reading the literal back undoes the relayout.
    let back: HostTensor = make_tensor_from_literal(&literal);
    assert_eq!(back.data::<f32>(), tensor.data::<f32>());
}

#[test]
fn shape_for_device_applies_the_layout_policy() {
    let policy = LayoutPolicy::default();
    let tensor = HostTensor::zeros(ScalarKind::F32, &[2, 3, 4, 5]);
    let tpu = shape_for_device(&tensor, Device::new(DeviceKind::Tpu, 0), &policy);
    assert_eq!(tpu.minor_to_major(), &[0, 1, 3, 2]);
    assert_eq!(tpu.element_type(), ElementType::F32);
    let cpu = shape_for_device(&tensor, Device::new(DeviceKind::Cpu, 0), &policy);
    assert_eq!(cpu.minor_to_major(), &[3, 2, 1, 0]);
}

#[test]
fn single_tensor_transfer_yields_one_handle() {
    let client = CpuClient::new();
    let policy = LayoutPolicy::default();
    let values: Vec<f32> = (0..16).map(|v| v as f32).collect();
    let tensor = HostTensor::from_vec(&[2, 2, 2, 2], values);
    let device = Device::new(DeviceKind::Tpu, 0);

    let data = tensor_to_device_data(&client, &policy, &tensor, device)
        .unwrap_or_else(|err| panic!("transfer failed: {err}"));
    assert_eq!(data.device(), device);
    assert_eq!(data.literal().shape().minor_to_major(), &[0, 1, 3, 2]);

    let back: HostTensor = make_tensor_from_literal(data.literal());
    assert_eq!(back.data::<f32>(), tensor.data::<f32>());
}

#[test]
fn caller_supplied_shapes_override_the_policy_layout() {
    let client = CpuClient::new();
    let tensor = HostTensor::from_vec(&[2, 3], vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let shape = Shape::with_layout(ElementType::F32, &[2, 3], &[0, 1]);
    let device = Device::new(DeviceKind::Cpu, 0);

    let data = tensor_to_device_data_with_shape(&client, &tensor, shape, device)
        .unwrap_or_else(|err| panic!("transfer failed: {err}"));
    assert_eq!(data.literal().shape().minor_to_major(), &[0, 1]);

    // Dimension 0 varies fastest under the supplied layout.
    let raw = Literal::from_bytes(
        Shape::with_descending_layout(ElementType::F32, &[6]),
        data.literal().bytes().to_vec(),
    );
    let physical: HostTensor = make_tensor_from_literal(&raw);
    assert_eq!(physical.data::<f32>(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);

    let back: HostTensor = make_tensor_from_literal(data.literal());
    assert_eq!(back.data::<f32>(), tensor.data::<f32>());
}

#[test]
fn batched_transfers_keep_input_order() {
    let client = CpuClient::new();
    let policy = LayoutPolicy::default();
    let tensors = vec![
        HostTensor::from_vec(&[2], vec![1.0f32, 2.0]),
        HostTensor::from_vec(&[3], vec![3.0f32, 4.0, 5.0]),
    ];
    let devices = vec![Device::new(DeviceKind::Cpu, 0), Device::new(DeviceKind::Tpu, 1)];

    let handles = create_tensors_data(&client, &policy, &tensors, &devices)
        .unwrap_or_else(|err| panic!("transfer failed: {err}"));
    assert_eq!(handles.len(), 2);
    assert_eq!(handles[0].device(), devices[0]);
    assert_eq!(handles[1].device(), devices[1]);
    assert_eq!(handles[0].literal().shape().dims(), &[2]);
    let second: HostTensor = make_tensor_from_literal(handles[1].literal());
    assert_eq!(second.data::<f32>(), &[3.0, 4.0, 5.0]);
}

#[test]
#[should_panic(expected = "handles for one source")]
fn extra_transfer_handles_panic() {
    struct DoublingClient;

    impl TransferClient for DoublingClient {
        type Data = u32;

        fn transfer_to_server<A: HostArray>(
            &self,
            sources: &[TensorSource<'_, A>],
        ) -> Result<Vec<u32>> {
            Ok(vec![0; sources.len() + 1])
        }
    }

    let policy = LayoutPolicy::default();
    let tensor = HostTensor::from_vec(&[2], vec![1.0f32, 2.0]);
    let device = Device::new(DeviceKind::Cpu, 0);
    let _ = tensor_to_device_data(&DoublingClient, &policy, &tensor, device);
}

#[test]
#[should_panic(expected = "2 tensors for 1 devices")]
fn mismatched_batch_lengths_panic() {
    let client = CpuClient::new();
    let policy = LayoutPolicy::default();
    let tensors = vec![
        HostTensor::from_vec(&[1], vec![1.0f32]),
        HostTensor::from_vec(&[1], vec![2.0f32]),
    ];
    let devices = vec![Device::new(DeviceKind::Cpu, 0)];
    let _ = create_tensors_data(&client, &policy, &tensors, &devices);
}

#[test]
#[should_panic(expected = "destination buffer size mismatch")]
fn mismatched_literal_element_width_panics() {
    let tensor = HostTensor::from_vec(&[2], vec![1i32, 2]);
    let shape = Shape::with_descending_layout(ElementType::Si64, &[2]);
    get_tensor_literal(&tensor, Some(&shape));
}

#[test]
#[should_panic(expected = "does not match dims")]
fn wrong_host_data_length_panics() {
    HostTensor::from_vec(&[2, 3], vec![1.0f32, 2.0]);
}

#[test]
fn literals_serialize_with_their_payload() {
    let tensor = HostTensor::from_vec(&[2], vec![1i16, -2]);
    let literal = get_tensor_literal(&tensor, None);
    let json = serde_json::to_value(&literal).unwrap_or_else(|err| panic!("serialize failed: {err}"));
    assert_eq!(json["shape"]["dims"], serde_json::json!([2]));
    assert_eq!(json["bytes"].as_array().map(Vec::len), Some(4));

    let decoded: tensorlink::Literal =
        serde_json::from_value(json).unwrap_or_else(|err| panic!("deserialize failed: {err}"));
    assert_eq!(decoded, literal);
}
