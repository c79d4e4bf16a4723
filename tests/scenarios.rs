//! End-to-end alignment scenarios.
//!
//! These tests run the public pipeline on small hand-built sentences and
//! check the structural guarantees every finished alignment must satisfy:
//! spans partition the sentence, fragments are connected, and nothing has
//! two primary owners.

use amr_align::align::repair::{RepairOutcome, repair};
use amr_align::align::{AlignmentTask, Pass, SubgraphAligner, align_sentence};
use amr_align::alignment::{AlignmentCollection, AlignmentKind, AlignmentSet};
use amr_align::config::AlignConfig;
use amr_align::corpus::Corpus;
use amr_align::graph::traverse::is_connected_subgraph;
use amr_align::graph::{NodeId, SemanticGraph};
use amr_align::sentence::{Sentence, Span};
use amr_align::train::run_pipeline;

fn words(s: &str) -> Vec<String> {
    s.split(' ').map(String::from).collect()
}

fn sentence(id: &str, tokens: &str, lemmas: &str, graph: SemanticGraph) -> Sentence {
    Sentence::new(id, words(tokens), graph)
        .with_lemmas(words(lemmas))
        .unwrap()
}

/// see-01(:ARG0 John, :ARG1 Mary).
fn john_saw_mary(id: &str) -> Sentence {
    let mut g = SemanticGraph::new();
    let s = g.add_node("s", "see-01").unwrap();
    let j = g.add_node("j", "John").unwrap();
    let m = g.add_node("m", "Mary").unwrap();
    g.add_edge(s, ":ARG0", j).unwrap();
    g.add_edge(s, ":ARG1", m).unwrap();
    g.set_root(s).unwrap();
    sentence(id, "John saw Mary", "john see mary", g)
}

/// want-01(:ARG0 boy, :ARG1 go-02(:ARG0 boy)).
fn boy_wants_to_go(id: &str) -> Sentence {
    let mut g = SemanticGraph::new();
    let w = g.add_node("w", "want-01").unwrap();
    let b = g.add_node("b", "boy").unwrap();
    let go = g.add_node("g", "go-02").unwrap();
    g.add_edge(w, ":ARG0", b).unwrap();
    g.add_edge(w, ":ARG1", go).unwrap();
    g.add_edge(go, ":ARG0", b).unwrap();
    g.set_root(w).unwrap();
    sentence(id, "the boy wants to go", "the boy want to go", g)
        .with_pos(words("DT NN VBZ TO VB"))
        .unwrap()
}

fn corpus(sentences: Vec<Sentence>) -> Corpus {
    let mut corpus = Corpus::new();
    for s in sentences {
        corpus.push(s).unwrap();
    }
    corpus
}

fn short_config() -> AlignConfig {
    AlignConfig {
        num_epochs: 2,
        ..AlignConfig::default()
    }
}

/// Primary subgraph spans are pairwise disjoint and cover every token.
fn assert_partition(sentence: &Sentence, set: &AlignmentSet) {
    let mut covered = vec![0usize; sentence.tokens().len()];
    for record in set.iter().filter(|r| r.kind == AlignmentKind::Subgraph) {
        for t in record.span.tokens() {
            covered[t] += 1;
        }
    }
    assert!(covered.iter().all(|&c| c == 1), "{}: {covered:?}", sentence.id());
}

fn assert_connected(sentence: &Sentence, set: &AlignmentSet) {
    for record in set.iter().filter(|r| r.kind.is_primary() && r.nodes.len() > 1) {
        assert!(
            is_connected_subgraph(sentence.graph(), &record.nodes),
            "{}: {:?}",
            sentence.id(),
            record
        );
    }
}

fn assert_invariants(corpus: &Corpus, alignments: &AlignmentCollection) {
    for sentence in corpus.sentences() {
        let set = alignments.get(sentence.id()).unwrap();
        set.validate(sentence).unwrap();
        assert_partition(sentence, set);
        assert_connected(sentence, set);
    }
}

#[test]
fn john_saw_mary_end_to_end() {
    let corpus = corpus(vec![john_saw_mary("s1")]);
    let output = run_pipeline(&short_config(), &corpus).unwrap();
    let sentence = &corpus.sentences()[0];
    let graph = sentence.graph();

    let subgraphs = output.subgraphs.get("s1").unwrap();
    for (name, span) in [("j", 0), ("s", 1), ("m", 2)] {
        let node = graph.node_by_name(name).unwrap();
        assert_eq!(subgraphs.node_owner(node).unwrap().span, Span::single(span), "{name}");
    }

    let relations = output.relations.get("s1").unwrap();
    for edge in graph.edges() {
        assert_eq!(relations.edge_owner(edge).unwrap().span, Span::single(1), "{edge:?}");
    }
    relations.validate(sentence).unwrap();

    assert!(output.reentrancies.get("s1").unwrap().is_empty());
    assert_eq!(output.reports.len(), 3);
    for report in &output.reports {
        assert_eq!(report.epochs.len(), 2);
        assert_eq!(report.final_coverage().fraction(), 1.0, "{}", report.task);
    }
}

#[test]
fn reentrant_subject_gets_a_primary_edge() {
    let corpus = corpus(vec![boy_wants_to_go("r1"), john_saw_mary("s1")]);
    let output = run_pipeline(&short_config(), &corpus).unwrap();
    assert_invariants(&corpus, &output.subgraphs);

    let sentence = corpus.get("r1").unwrap();
    let graph = sentence.graph();
    let boy = graph.node_by_name("b").unwrap();
    assert_eq!(graph.in_degree(boy), 2);

    let reentrancies = output.reentrancies.get("r1").unwrap();
    let primaries: Vec<_> = reentrancies
        .iter()
        .filter(|r| r.kind == AlignmentKind::Reentrancy(amr_align::alignment::ReentrancyKind::Primary))
        .collect();
    assert_eq!(primaries.len(), 1);
    assert_eq!(primaries[0].edges.len(), 1);
    assert_eq!(primaries[0].edges[0].target, boy);
    for record in reentrancies {
        assert_eq!(record.edges.len(), 1);
        assert!(record.nodes.is_empty());
    }
}

#[test]
fn repeated_concept_surfaces_as_duplicate_record() {
    let mut g = SemanticGraph::new();
    let c = g.add_node("c", "chase-01").unwrap();
    let d1 = g.add_node("d1", "dog").unwrap();
    let d2 = g.add_node("d2", "dog").unwrap();
    g.add_edge(c, ":ARG0", d1).unwrap();
    g.add_edge(c, ":ARG1", d2).unwrap();
    g.set_root(c).unwrap();
    let corpus = corpus(vec![sentence("d", "dog chase", "dog chase", g)]);
    let sentence = &corpus.sentences()[0];

    let mut gold = AlignmentSet::empty_per_span(sentence, AlignmentKind::Subgraph);
    gold.replace(0, gold.records()[0].with_node(d1));
    gold.replace(1, gold.records()[1].with_node(c));
    let gold: AlignmentCollection = [("d".to_string(), gold)].into_iter().collect();

    let config = AlignConfig {
        english: false,
        ..AlignConfig::default()
    };
    let mut aligner = SubgraphAligner::new(config, &corpus);
    aligner.update_parameters(&corpus, &gold).unwrap();
    let set = align_sentence(&aligner, sentence).unwrap();

    assert_eq!(set.node_owner(c).unwrap().span, Span::single(1));
    assert_eq!(set.node_owner(d1).unwrap().span, Span::single(0));
    assert!(set.node_owner(d2).is_none());
    let dupl: Vec<_> = set
        .iter()
        .filter(|r| r.kind == AlignmentKind::DuplicateSubgraph)
        .collect();
    assert_eq!(dupl.len(), 1);
    assert_eq!(dupl[0].span, Span::single(0));
    assert_eq!(dupl[0].nodes, vec![d2]);
    assert!(aligner.unaligned(sentence, &set, Pass::Final).is_empty());
    set.validate(sentence).unwrap();
    assert_partition(sentence, &set);
}

/// chase-01(:ARG0 dog, :ARG1 dog).
fn dog_chases_dog(id: &str, tokens: &str, lemmas: &str) -> Sentence {
    let mut g = SemanticGraph::new();
    let c = g.add_node("c", "chase-01").unwrap();
    let d1 = g.add_node("d1", "dog").unwrap();
    let d2 = g.add_node("d2", "dog").unwrap();
    g.add_edge(c, ":ARG0", d1).unwrap();
    g.add_edge(c, ":ARG1", d2).unwrap();
    g.set_root(c).unwrap();
    sentence(id, tokens, lemmas, g)
}

/// bark-01(:ARG0 dog), "the dog barked".
fn dog_barked(id: &str) -> Sentence {
    let mut g = SemanticGraph::new();
    let b = g.add_node("b", "bark-01").unwrap();
    let d = g.add_node("d", "dog").unwrap();
    g.add_edge(b, ":ARG0", d).unwrap();
    g.set_root(b).unwrap();
    sentence(id, "the dog barked", "the dog bark", g)
}

/// The second `dog` must sit as a duplicate on the span realizing the
/// concept, never join the fragment of its parent.
fn assert_duplicate_on(sentence: &Sentence, set: &AlignmentSet, dog_span: usize, chase_span: usize) {
    let graph = sentence.graph();
    let c = graph.node_by_name("c").unwrap();
    let dogs = [graph.node_by_name("d1").unwrap(), graph.node_by_name("d2").unwrap()];

    let chase = set.node_owner(c).unwrap();
    assert_eq!(chase.span, Span::single(chase_span));
    assert_eq!(chase.nodes, vec![c]);

    let primary: Vec<_> = dogs.iter().copied().filter(|&d| set.node_owner(d).is_some()).collect();
    assert_eq!(primary.len(), 1, "{set:?}");
    assert_eq!(set.node_owner(primary[0]).unwrap().span, Span::single(dog_span));

    let dupl: Vec<_> = set
        .iter()
        .filter(|r| r.kind == AlignmentKind::DuplicateSubgraph)
        .collect();
    assert_eq!(dupl.len(), 1, "{set:?}");
    assert_eq!(dupl[0].span, Span::single(dog_span));
    assert_eq!(dupl[0].nodes.len(), 1);
    assert!(dogs.contains(&dupl[0].nodes[0]));
    assert_ne!(dupl[0].nodes[0], primary[0]);
}

#[test]
fn unseeded_duplicate_lands_on_the_concept_span() {
    let corpus = corpus(vec![dog_chases_dog("d", "dog chase", "dog chase")]);
    let output = run_pipeline(&short_config(), &corpus).unwrap();
    let sentence = &corpus.sentences()[0];
    let set = output.subgraphs.get("d").unwrap();
    assert_duplicate_on(sentence, set, 0, 1);
    set.validate(sentence).unwrap();
}

#[test]
fn learned_counts_pull_the_duplicate_off_function_words() {
    let corpus = corpus(vec![
        dog_barked("b1"),
        dog_barked("b2"),
        dog_barked("b3"),
        dog_chases_dog("c", "the dog chased itself", "the dog chase itself"),
    ]);
    let config = AlignConfig {
        num_epochs: 3,
        ..AlignConfig::default()
    };
    let output = run_pipeline(&config, &corpus).unwrap();
    assert_invariants(&corpus, &output.subgraphs);
    let sentence = corpus.get("c").unwrap();
    assert_duplicate_on(sentence, output.subgraphs.get("c").unwrap(), 1, 2);
}

#[test]
fn disconnected_proposal_cannot_claim_a_taken_bridge() {
    let mut g = SemanticGraph::new();
    let a = g.add_node("a", "alpha").unwrap();
    let b = g.add_node("b", "beta").unwrap();
    let c = g.add_node("c", "gamma").unwrap();
    g.add_edge(a, ":ARG0", b).unwrap();
    g.add_edge(b, ":ARG1", c).unwrap();
    g.set_root(a).unwrap();
    let corpus = corpus(vec![sentence("x", "one two three", "one two three", g)]);
    let sentence = &corpus.sentences()[0];

    let mut nodes = vec![a, c];
    let outcome = repair(sentence.graph(), &mut nodes, &|n: NodeId| n != b);
    assert_eq!(outcome, RepairOutcome::Reduced { dropped: vec![c] });

    let config = AlignConfig {
        english: false,
        ..AlignConfig::default()
    };
    let aligner = SubgraphAligner::new(config, &corpus);
    let mut set = AlignmentSet::empty_per_span(sentence, AlignmentKind::Subgraph);
    set.replace(0, set.records()[0].with_node(a));
    set.replace(1, set.records()[1].with_node(b));

    assert!(aligner.attach(sentence, &set, &c, 0).unwrap().is_none());
    let joined = aligner.attach(sentence, &set, &c, 1).unwrap().unwrap();
    assert_eq!(joined.replaces, Some(1));
    assert!(is_connected_subgraph(sentence.graph(), &joined.record.nodes));
    let alone = aligner.attach(sentence, &set, &c, 2).unwrap().unwrap();
    assert_eq!(alone.record.nodes, vec![c]);
}

#[test]
fn invariants_hold_across_a_mixed_corpus() {
    let corpus = corpus(vec![
        john_saw_mary("s1"),
        boy_wants_to_go("r1"),
        john_saw_mary("s2"),
    ]);
    let output = run_pipeline(&short_config(), &corpus).unwrap();
    assert_invariants(&corpus, &output.subgraphs);
    for sentence in corpus.sentences() {
        output.relations.get(sentence.id()).unwrap().validate(sentence).unwrap();
        output.reentrancies.get(sentence.id()).unwrap().validate(sentence).unwrap();
    }
}

#[test]
fn alignments_survive_a_file_round_trip() {
    let corpus = corpus(vec![john_saw_mary("s1"), boy_wants_to_go("r1")]);
    let output = run_pipeline(&short_config(), &corpus).unwrap();
    let dir = tempfile::TempDir::new().unwrap();

    let corpus_path = dir.path().join("corpus.json");
    std::fs::write(&corpus_path, corpus.to_json().unwrap()).unwrap();
    let reloaded = Corpus::load(&corpus_path).unwrap();
    assert_eq!(reloaded.len(), 2);

    let path = dir.path().join("relations.json");
    output.relations.save(&path, &corpus).unwrap();
    let loaded = AlignmentCollection::load(&path, &reloaded).unwrap();
    assert_eq!(loaded, output.relations);
}
