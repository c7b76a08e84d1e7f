use mutarray::{Heap, Kind, LayoutDescriptor, ObjectType, PatchError, Patcher, Value};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn fixnums(values: &[isize]) -> Vec<Value> {
    values.iter().copied().map(Value::from_fixnum).collect()
}

fn contents(heap: &Heap, value: Value) -> Vec<isize> {
    heap.view(value)
        .expect("live object")
        .iter()
        .map(|v| v.as_fixnum().expect("fixnum element"))
        .collect()
}

#[test]
fn replace_splice_truncate_sequence() {
    init_logging();
    let mut heap = Heap::default();
    let t = heap.allocate_array(&fixnums(&[1, 2, 3, 4, 5])).unwrap();
    let s = heap.allocate_array(&fixnums(&[42, 43])).unwrap();
    let patcher = heap.patcher();

    unsafe { patcher.replace_at(t, Value::from(315), 1) }.unwrap();
    assert_eq!(contents(&heap, t), [1, 315, 3, 4, 5]);

    unsafe { patcher.splice_from(t, s, 3) }.unwrap();
    assert_eq!(contents(&heap, t), [1, 315, 3, 42, 43]);

    unsafe { patcher.set_length(t, 3) }.unwrap();
    assert_eq!(contents(&heap, t), [1, 315, 3]);

    let view = heap.view(t).unwrap();
    assert_eq!(view.len(), 3);
    assert_eq!(unsafe { view.get_unchecked(3) }, Value::from(42));
    assert_eq!(unsafe { view.get_unchecked(4) }, Value::from(43));
}

#[test]
fn aliases_observe_the_mutation() {
    init_logging();
    let mut heap = Heap::default();
    let t = heap.allocate_array(&fixnums(&[1, 2, 3])).unwrap();
    let holder = heap.allocate_array(&[t]).unwrap();
    let alias = heap.view(holder).unwrap().get(0).unwrap();

    unsafe { heap.patcher().replace_at(t, Value::from(20), 1) }.unwrap();

    assert_eq!(alias, t);
    assert_eq!(contents(&heap, alias), [1, 20, 3]);
}

#[test]
fn failed_call_keeps_earlier_mutations() {
    init_logging();
    let mut heap = Heap::default();
    let t = heap.allocate_array(&fixnums(&[1, 2, 3])).unwrap();
    let s = heap.allocate_array(&fixnums(&[7, 8, 9])).unwrap();
    let patcher = heap.patcher();

    unsafe { patcher.replace_at(t, Value::from(10), 0) }.unwrap();
    let err = unsafe { patcher.splice_from(t, s, 1) }.unwrap_err();

    assert_eq!(
        err,
        PatchError::Capacity {
            requested: 4,
            capacity: 3
        }
    );
    assert_eq!(contents(&heap, t), [10, 2, 3]);
}

#[test]
fn custom_array_type_tag() {
    init_logging();
    let mut heap = Heap::default();
    let record = heap
        .allocate_object(ObjectType::Record, &fixnums(&[1, 2]), 2)
        .unwrap();
    let array = heap.allocate_array(&fixnums(&[1, 2])).unwrap();
    let patcher = Patcher::with_array_type(*heap.layout(), ObjectType::Record);

    unsafe { patcher.replace_at(record, Value::from(5), 1) }.unwrap();
    assert_eq!(contents(&heap, record), [1, 5]);

    let err = unsafe { patcher.replace_at(array, Value::from(5), 1) }.unwrap_err();
    assert_eq!(
        err,
        PatchError::TypeKind {
            expected: ObjectType::Record,
            found: Kind::Object(ObjectType::Array)
        }
    );
}

#[cfg(target_pointer_width = "64")]
#[test]
fn compact_header_layout() {
    init_logging();
    let layout = LayoutDescriptor::new(8, 4, 4, 8).unwrap();
    assert_eq!(layout.header_size(), 16);

    let mut heap = Heap::new(layout);
    let t = heap.allocate_array(&fixnums(&[1, 2, 3, 4, 5])).unwrap();
    let s = heap.allocate_array(&fixnums(&[42, 43])).unwrap();
    let patcher = heap.patcher();
    assert_eq!(patcher.compute_slot_offset(1), 24);

    unsafe {
        patcher.replace_at(t, Value::from(315), 1).unwrap();
        patcher.splice_from(t, s, 3).unwrap();
        patcher.set_length(t, 4).unwrap();
    }

    assert_eq!(contents(&heap, t), [1, 315, 3, 42]);
    assert_eq!(heap.refcount_of(t), Some(1));
    assert_eq!(
        heap.view(t).unwrap().object_type(),
        Some(ObjectType::Array)
    );
}

#[test]
fn unique_buffer_workflow() {
    init_logging();
    let mut heap = Heap::default();
    let element = heap.allocate_object(ObjectType::Boxed, &fixnums(&[9]), 1).unwrap();
    let t = heap
        .allocate_array_with_capacity(&fixnums(&[1, 2, 3]), 5)
        .unwrap();

    {
        let mut array = heap.unique_mut(t).unwrap();
        array.replace(0, element).unwrap();
        array.set_length(5).unwrap();
        array.splice(3, &fixnums(&[4, 5])).unwrap();
        assert_eq!(array.len(), 5);
        array.truncate(1);
    }
    heap.release(element);

    assert_eq!(heap.refcount_of(element), Some(1));
    heap.release(t);
    assert_eq!(heap.live_objects(), 0);
}
