use meshview::events::ViewerEvent;
use meshview::selection::{
    collect_selected, deselect, is_hovered, is_selected, select, set_hovered, set_selected, SelectionBehavior,
};
use meshview::Registry;

fn selection_events(registry: &mut Registry) -> Vec<ViewerEvent> {
    registry
        .drain_events()
        .into_iter()
        .filter(|event| matches!(event, ViewerEvent::Selected { .. } | ViewerEvent::Deselected { .. }))
        .collect()
}

#[test]
fn set_sequence_keeps_exactly_the_latest_entity() {
    let mut registry = Registry::headless();
    let entities: Vec<_> = (0..5).map(|_| registry.create_entity()).collect();

    assert!(set_selected(&mut registry, entities[0], SelectionBehavior::Set));
    assert_eq!(selection_events(&mut registry), vec![ViewerEvent::Selected { entity: entities[0] }]);

    for pair in entities.windows(2) {
        let (previous, next) = (pair[0], pair[1]);
        assert!(set_selected(&mut registry, next, SelectionBehavior::Set));
        assert_eq!(collect_selected(&mut registry), vec![next]);
        assert_eq!(
            selection_events(&mut registry),
            vec![ViewerEvent::Deselected { entity: previous }, ViewerEvent::Selected { entity: next }]
        );
    }
}

#[test]
fn select_then_deselect_restores_prior_set() {
    let mut registry = Registry::headless();
    let kept = registry.create_entity();
    let target = registry.create_entity();
    select(&mut registry, kept);
    registry.drain_events();

    assert!(select(&mut registry, target));
    assert!(deselect(&mut registry, target));
    assert_eq!(collect_selected(&mut registry), vec![kept]);
    assert_eq!(
        selection_events(&mut registry),
        vec![ViewerEvent::Selected { entity: target }, ViewerEvent::Deselected { entity: target }]
    );
}

#[test]
fn toggle_twice_is_an_involution() {
    let mut registry = Registry::headless();
    let a = registry.create_entity();
    let b = registry.create_entity();
    select(&mut registry, b);

    for target in [a, b] {
        let before = collect_selected(&mut registry);
        assert!(set_selected(&mut registry, target, SelectionBehavior::Toggle));
        assert!(set_selected(&mut registry, target, SelectionBehavior::Toggle));
        assert_eq!(collect_selected(&mut registry), before);
    }
}

#[test]
fn hover_set_is_independent_of_selection() {
    let mut registry = Registry::headless();
    let a = registry.create_entity();
    let b = registry.create_entity();
    select(&mut registry, a);
    set_hovered(&mut registry, b, SelectionBehavior::Set);
    set_hovered(&mut registry, a, SelectionBehavior::Set);

    assert!(is_selected(&registry, a));
    assert!(!is_selected(&registry, b));
    assert!(is_hovered(&registry, a));
    assert!(!is_hovered(&registry, b));
}

#[test]
fn listeners_run_at_the_point_of_mutation() {
    use std::sync::{Arc, Mutex};

    let mut registry = Registry::headless();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    registry.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

    let e = registry.create_entity();
    select(&mut registry, e);
    assert_eq!(*seen.lock().unwrap(), vec![ViewerEvent::Selected { entity: e }]);
    registry.destroy_entity(e);
    assert_eq!(seen.lock().unwrap().last(), Some(&ViewerEvent::Deselected { entity: e }));
}
