//! Behavioral tests driving compiled designs end to end: DSL → elaborate
//! → netlist → evaluation graph.

use std::any::Any;

use num_bigint::BigInt;
use weft_core::{
    COMB, ElabResult, Elaboratable, Memory, MemoryData, Module, Shape, Signal, Value,
};
use weft_sim::{SimError, compile};
use weftc::{EnableInserter, ResetInserter, build_netlist, elaborate};

fn int(v: i64) -> BigInt {
    BigInt::from(v)
}

struct Counter {
    en: Signal,
    count: Signal,
}

impl Counter {
    fn new() -> Counter {
        Counter {
            en: Signal::named(Shape::unsigned(1), "en"),
            count: Signal::named(Shape::unsigned(16), "count"),
        }
    }
}

impl Elaboratable for Counter {
    fn elaborate(&self, _: Option<&dyn Any>) -> ElabResult {
        let mut m = Module::new();
        m.enter_if(self.en.value()).unwrap();
        m.add_assignment(
            "sync",
            self.count.value(),
            self.count.value().add(&Value::int(1)).unwrap(),
        )
        .unwrap();
        m.exit_scope().unwrap();
        ElabResult::Module(m)
    }
}

#[test]
fn test_up_counter_with_enable_and_reset() {
    let design = Counter::new();
    let fragment = elaborate(&design, None).unwrap();
    let net = build_netlist(&fragment, &[]).unwrap();
    let rst = net.domains[0].domain.rst().unwrap().clone();
    let mut g = compile(&net).unwrap();

    assert_eq!(g.get(&design.count), int(0));
    g.set(&design.en, 1);
    g.tick("sync").unwrap();
    assert_eq!(g.get(&design.count), int(1));
    g.tick("sync").unwrap();
    g.tick("sync").unwrap();
    assert_eq!(g.get(&design.count), int(3));

    // Deasserting the enable holds the count.
    g.set(&design.en, 0);
    g.tick("sync").unwrap();
    assert_eq!(g.get(&design.count), int(3));

    // The domain reset returns the register to its init value even while
    // the enable is asserted.
    g.set(&design.en, 1);
    g.set(&rst, 1);
    g.tick("sync").unwrap();
    assert_eq!(g.get(&design.count), int(0));
    g.set(&rst, 0);
    g.tick("sync").unwrap();
    assert_eq!(g.get(&design.count), int(1));
}

#[test]
fn test_counter_wraps_at_width() {
    // The 17-bit sum is truncated back into the 16-bit register.
    let design = Counter::new();
    let fragment = elaborate(&design, None).unwrap();
    let net = build_netlist(&fragment, &[]).unwrap();
    let mut g = compile(&net).unwrap();
    g.set(&design.en, 1);
    let count_slot = g.slot_of(&design.count).unwrap();
    g.set_slot(count_slot, 0xFFFF);
    g.tick("sync").unwrap();
    assert_eq!(g.get(&design.count), int(0));
}

struct TwoStateFsm {
    start: Signal,
    done: Signal,
    busy: Signal,
}

impl TwoStateFsm {
    fn new() -> TwoStateFsm {
        TwoStateFsm {
            start: Signal::named(Shape::unsigned(1), "start"),
            done: Signal::named(Shape::unsigned(1), "done"),
            busy: Signal::named(Shape::unsigned(1), "busy"),
        }
    }
}

impl Elaboratable for TwoStateFsm {
    fn elaborate(&self, _: Option<&dyn Any>) -> ElabResult {
        let mut m = Module::new();
        m.enter_fsm(Some("ctrl"), "sync", None).unwrap();
        m.enter_state("IDLE").unwrap();
        m.enter_if(self.start.value()).unwrap();
        m.fsm_next("RUN").unwrap();
        m.exit_scope().unwrap();
        m.exit_scope().unwrap();
        m.enter_state("RUN").unwrap();
        m.add_assignment(COMB, self.busy.value(), Value::int(1)).unwrap();
        m.enter_if(self.done.value()).unwrap();
        m.fsm_next("IDLE").unwrap();
        m.exit_scope().unwrap();
        m.exit_scope().unwrap();
        m.exit_scope().unwrap();
        ElabResult::Module(m)
    }
}

#[test]
fn test_two_state_fsm() {
    let design = TwoStateFsm::new();
    let fragment = elaborate(&design, None).unwrap();
    let net = build_netlist(&fragment, &[]).unwrap();
    let mut g = compile(&net).unwrap();

    // Idle out of reset; not busy.
    assert_eq!(g.get(&design.busy), int(0));

    // Without start the FSM stays idle.
    g.tick("sync").unwrap();
    assert_eq!(g.get(&design.busy), int(0));

    g.set(&design.start, 1);
    g.tick("sync").unwrap();
    assert_eq!(g.get(&design.busy), int(1));

    // RUN holds until done.
    g.set(&design.start, 0);
    g.tick("sync").unwrap();
    assert_eq!(g.get(&design.busy), int(1));

    g.set(&design.done, 1);
    g.tick("sync").unwrap();
    assert_eq!(g.get(&design.busy), int(0));
}

struct MemoryRoundTrip {
    mem: Memory,
}

impl MemoryRoundTrip {
    fn new(transparent: bool) -> MemoryRoundTrip {
        let mut mem = Memory::new(MemoryData::new(
            "buf",
            4,
            Shape::unsigned(8),
            vec![int(0), int(1), int(2), int(3)],
        ));
        let wp = mem.write_port("sync");
        let transparent_for = if transparent { vec![wp] } else { vec![] };
        mem.read_port(Some("sync"), transparent_for).unwrap();
        MemoryRoundTrip { mem }
    }
}

impl Elaboratable for MemoryRoundTrip {
    fn elaborate(&self, _: Option<&dyn Any>) -> ElabResult {
        let mut m = Module::new();
        m.add_submodule(Some("buf"), self.mem.clone()).unwrap();
        ElabResult::Module(m)
    }
}

#[test]
fn test_memory_transparent_round_trip() {
    let design = MemoryRoundTrip::new(true);
    let wp = design.mem.write_ports[0].clone();
    let rp = design.mem.read_ports[0].clone();
    let fragment = elaborate(&design, None).unwrap();
    let net = build_netlist(&fragment, &[]).unwrap();
    let mut g = compile(&net).unwrap();

    // Write and read the same address in one cycle: the transparent read
    // port returns the just-written value on the next cycle.
    g.set(&wp.addr, 2);
    g.set(&wp.data, 0x55);
    g.set(&wp.en, 1);
    g.set(&rp.addr, 2);
    g.tick("sync").unwrap();
    assert_eq!(g.get(&rp.data), int(0x55));

    // Reading another row returns its init value.
    g.set(&wp.en, 0);
    g.set(&rp.addr, 3);
    g.tick("sync").unwrap();
    assert_eq!(g.get(&rp.data), int(3));

    // The read enable defaults to asserted; deasserting it holds the
    // read register.
    g.set(&rp.en, 0);
    g.set(&rp.addr, 0);
    g.tick("sync").unwrap();
    assert_eq!(g.get(&rp.data), int(3));
}

#[test]
fn test_memory_non_transparent_reads_old_value() {
    let design = MemoryRoundTrip::new(false);
    let wp = design.mem.write_ports[0].clone();
    let rp = design.mem.read_ports[0].clone();
    let fragment = elaborate(&design, None).unwrap();
    let net = build_netlist(&fragment, &[]).unwrap();
    let mut g = compile(&net).unwrap();

    g.set(&wp.addr, 1);
    g.set(&wp.data, 0xAA);
    g.set(&wp.en, 1);
    g.set(&rp.addr, 1);
    g.tick("sync").unwrap();
    // Same-edge write is not visible without transparency.
    assert_eq!(g.get(&rp.data), int(1));
    g.set(&wp.en, 0);
    g.tick("sync").unwrap();
    assert_eq!(g.get(&rp.data), int(0xAA));
}

struct Follower {
    reg: Signal,
    val: Signal,
}

impl Follower {
    fn new() -> Follower {
        Follower {
            reg: Signal::builder(Shape::unsigned(8)).name("reg").init(7).build(),
            val: Signal::named(Shape::unsigned(8), "val"),
        }
    }
}

impl Elaboratable for Follower {
    fn elaborate(&self, _: Option<&dyn Any>) -> ElabResult {
        let mut m = Module::new();
        m.add_assignment("sync", self.reg.value(), self.val.value()).unwrap();
        ElabResult::Module(m)
    }
}

#[test]
fn test_enable_inserters_stack_as_conjunction() {
    let design = Follower::new();
    let e1 = Signal::named(Shape::unsigned(1), "e1");
    let e2 = Signal::named(Shape::unsigned(1), "e2");
    let fragment = elaborate(&design, None).unwrap();
    let fragment = EnableInserter::single("sync", e1.value()).apply(&fragment).unwrap();
    let fragment = EnableInserter::single("sync", e2.value()).apply(&fragment).unwrap();
    let net = build_netlist(&fragment, &[]).unwrap();
    let mut g = compile(&net).unwrap();

    g.set(&design.val, 42);
    let slot = g.slot_of(&design.reg).unwrap();
    for (v1, v2, expect) in [(0, 0, 7), (1, 0, 7), (0, 1, 7), (1, 1, 42)] {
        g.set(&e1, v1);
        g.set(&e2, v2);
        g.tick("sync").unwrap();
        assert_eq!(g.get(&design.reg), int(expect));
        // Put the register back for the next case.
        g.set_slot(slot, 7);
    }
}

#[test]
fn test_reset_and_enable_composition_behavior() {
    // r ? init : (e ? next : current)
    let design = Follower::new();
    let e = Signal::named(Shape::unsigned(1), "e");
    let r = Signal::named(Shape::unsigned(1), "r");
    let fragment = elaborate(&design, None).unwrap();
    let fragment = EnableInserter::single("sync", e.value()).apply(&fragment).unwrap();
    let fragment = ResetInserter::single("sync", r.value()).apply(&fragment).unwrap();
    let net = build_netlist(&fragment, &[]).unwrap();
    let mut g = compile(&net).unwrap();

    g.set(&design.val, 99);
    let slot = g.slot_of(&design.reg).unwrap();

    // e=1, r=0: the next value lands.
    g.set(&e, 1);
    g.tick("sync").unwrap();
    assert_eq!(g.get(&design.reg), int(99));

    // r=1 overrides the pending next value even while enabled.
    g.set(&r, 1);
    g.tick("sync").unwrap();
    assert_eq!(g.get(&design.reg), int(7));

    // r=1 with e=0 still resets.
    g.set_slot(slot, 33);
    g.set(&e, 0);
    g.tick("sync").unwrap();
    assert_eq!(g.get(&design.reg), int(7));

    // e=0, r=0 holds.
    g.set_slot(slot, 33);
    g.set(&r, 0);
    g.tick("sync").unwrap();
    assert_eq!(g.get(&design.reg), int(33));
}

struct CombLoop {
    a: Signal,
    b: Signal,
}

impl Elaboratable for CombLoop {
    fn elaborate(&self, _: Option<&dyn Any>) -> ElabResult {
        let mut m = Module::new();
        m.add_assignment(COMB, self.a.value(), self.b.value()).unwrap();
        m.add_assignment(COMB, self.b.value(), self.a.value()).unwrap();
        ElabResult::Module(m)
    }
}

#[test]
fn test_combinational_cycle_rejected() {
    let design = CombLoop {
        a: Signal::named(Shape::unsigned(1), "a"),
        b: Signal::named(Shape::unsigned(1), "b"),
    };
    let fragment = elaborate(&design, None).unwrap();
    let net = build_netlist(&fragment, &[]).unwrap();
    let err = compile(&net).unwrap_err();
    let SimError::CombinationalCycle { signals } = err else {
        panic!("expected a cycle error");
    };
    assert_eq!(signals, vec!["a".to_string(), "b".to_string()]);
}

struct InitialProbe {
    first: Signal,
    reg: Signal,
}

impl Elaboratable for InitialProbe {
    fn elaborate(&self, _: Option<&dyn Any>) -> ElabResult {
        let mut m = Module::new();
        m.add_assignment(COMB, self.first.value(), Value::initial()).unwrap();
        m.add_assignment("sync", self.reg.value(), Value::int(1)).unwrap();
        ElabResult::Module(m)
    }
}

#[test]
fn test_initial_is_high_for_one_cycle() {
    let design = InitialProbe {
        first: Signal::named(Shape::unsigned(1), "first"),
        reg: Signal::named(Shape::unsigned(1), "r"),
    };
    let fragment = elaborate(&design, None).unwrap();
    let net = build_netlist(&fragment, &[]).unwrap();
    let mut g = compile(&net).unwrap();
    assert_eq!(g.get(&design.first), int(1));
    g.tick("sync").unwrap();
    assert_eq!(g.get(&design.first), int(0));
    g.tick("sync").unwrap();
    assert_eq!(g.get(&design.first), int(0));
}

struct Printer {
    count: Signal,
}

impl Elaboratable for Printer {
    fn elaborate(&self, _: Option<&dyn Any>) -> ElabResult {
        let mut m = Module::new();
        m.add_assignment(
            "sync",
            self.count.value(),
            self.count.value().add(&Value::int(1)).unwrap(),
        )
        .unwrap();
        m.add_print("sync", "count={}", vec![self.count.value()]).unwrap();
        m.add_assert(
            "sync",
            self.count.value().lt(&Value::int(2)).unwrap(),
            Some("count stays small"),
        )
        .unwrap();
        ElabResult::Module(m)
    }
}

#[test]
fn test_sync_print_and_assert() {
    let design = Printer { count: Signal::named(Shape::unsigned(4), "count") };
    let fragment = elaborate(&design, None).unwrap();
    let net = build_netlist(&fragment, &[]).unwrap();
    let mut g = compile(&net).unwrap();

    g.tick("sync").unwrap();
    g.tick("sync").unwrap();
    // Prints sample the pre-edge value.
    assert_eq!(g.log(), &["count=0".to_string(), "count=1".to_string()]);
    assert!(g.violations().is_empty());

    // The third edge samples count == 2 and trips the assertion.
    g.tick("sync").unwrap();
    assert_eq!(g.violations().len(), 1);
    assert!(g.violations()[0].contains("count stays small"));
}

struct NibbleFile {
    word: Signal,
    sel: Signal,
    data: Signal,
    out: Signal,
}

impl Elaboratable for NibbleFile {
    fn elaborate(&self, _: Option<&dyn Any>) -> ElabResult {
        let mut m = Module::new();
        let target = self.word.value().word_select(&self.sel.value(), 4).unwrap();
        m.add_assignment("sync", target, self.data.value()).unwrap();
        m.add_assignment(
            COMB,
            self.out.value(),
            self.word.value().word_select(&self.sel.value(), 4).unwrap(),
        )
        .unwrap();
        ElabResult::Module(m)
    }
}

#[test]
fn test_dynamic_word_select_write_and_read() {
    let design = NibbleFile {
        word: Signal::named(Shape::unsigned(8), "word"),
        sel: Signal::named(Shape::unsigned(1), "sel"),
        data: Signal::named(Shape::unsigned(4), "data"),
        out: Signal::named(Shape::unsigned(4), "out"),
    };
    let fragment = elaborate(&design, None).unwrap();
    let net = build_netlist(&fragment, &[]).unwrap();
    let mut g = compile(&net).unwrap();

    // Write 0xA into the high nibble, then 0x5 into the low one.
    g.set(&design.sel, 1);
    g.set(&design.data, 0xA);
    g.tick("sync").unwrap();
    g.set(&design.sel, 0);
    g.set(&design.data, 0x5);
    g.tick("sync").unwrap();
    let word_slot = g.slot_of(&design.word).unwrap();
    assert_eq!(g.get_slot(word_slot), int(0xA5));

    // The combinational read follows the selector.
    g.settle();
    assert_eq!(g.get(&design.out), int(0x5));
    g.set(&design.sel, 1);
    g.settle();
    assert_eq!(g.get(&design.out), int(0xA));
}

#[test]
fn test_unknown_domain_tick() {
    let design = Counter::new();
    let fragment = elaborate(&design, None).unwrap();
    let net = build_netlist(&fragment, &[]).unwrap();
    let mut g = compile(&net).unwrap();
    assert_eq!(
        g.tick("video").unwrap_err(),
        SimError::UnknownDomain { name: "video".to_string() }
    );
}
