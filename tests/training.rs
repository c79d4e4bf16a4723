//! Reestimation and backoff behavior of the trained models.

use amr_align::align::SubgraphAligner;
use amr_align::align::relation::RelationModel;
use amr_align::align::subgraph::SubgraphModel;
use amr_align::alignment::{AlignmentCollection, AlignmentKind, AlignmentSet};
use amr_align::config::AlignConfig;
use amr_align::corpus::Corpus;
use amr_align::graph::SemanticGraph;
use amr_align::labels::SubgraphLabel;
use amr_align::sentence::{Sentence, Span};
use amr_align::train::Trainer;

fn words(s: &str) -> Vec<String> {
    s.split(' ').map(String::from).collect()
}

/// smile-01(:ARG0 person(:ARG0-of work-01)), "the worker smiled".
fn worker_smiled() -> Sentence {
    let mut g = SemanticGraph::new();
    let s = g.add_node("s", "smile-01").unwrap();
    let p = g.add_node("p", "person").unwrap();
    let t = g.add_node("t", "work-01").unwrap();
    g.add_edge(s, ":ARG0", p).unwrap();
    g.add_edge(p, ":ARG0-of", t).unwrap();
    g.set_root(s).unwrap();
    Sentence::new("t1", words("the worker smiled"), g)
        .with_lemmas(words("the worker smile"))
        .unwrap()
}

/// school, over the single two-token span "high school".
fn high_school() -> Sentence {
    let mut g = SemanticGraph::new();
    let s = g.add_node("s", "school").unwrap();
    g.set_root(s).unwrap();
    Sentence::new("h1", words("high school"), g)
        .with_lemmas(words("high school"))
        .unwrap()
        .with_spans(vec![Span::new(0, 2)])
        .unwrap()
}

/// school, "school".
fn school() -> Sentence {
    let mut g = SemanticGraph::new();
    let s = g.add_node("s", "school").unwrap();
    g.set_root(s).unwrap();
    Sentence::new("s1", words("school"), g)
        .with_lemmas(words("school"))
        .unwrap()
}

fn corpus(sentences: Vec<Sentence>) -> Corpus {
    let mut corpus = Corpus::new();
    for s in sentences {
        corpus.push(s).unwrap();
    }
    corpus
}

/// Gold subgraph records for `worker_smiled` and `school`.
fn gold(corpus: &Corpus) -> AlignmentCollection {
    let mut out = AlignmentCollection::new();
    for sentence in corpus.sentences() {
        let graph = sentence.graph();
        let mut set = AlignmentSet::empty_per_span(sentence, AlignmentKind::Subgraph);
        match sentence.id() {
            "t1" => {
                let p = graph.node_by_name("p").unwrap();
                let t = graph.node_by_name("t").unwrap();
                let s = graph.node_by_name("s").unwrap();
                set.replace(1, set.records()[1].with_nodes(vec![p, t]));
                set.replace(2, set.records()[2].with_node(s));
            }
            "s1" => {
                let s = graph.node_by_name("s").unwrap();
                set.replace(0, set.records()[0].with_node(s));
            }
            _ => {}
        }
        out.insert(sentence.id(), set);
    }
    out
}

#[test]
fn observed_pairs_score_from_the_translation_table() {
    let corpus = corpus(vec![worker_smiled(), school()]);
    let config = AlignConfig::default();
    let model = SubgraphModel::estimate(&config, &corpus, &gold(&corpus));

    let sentence = corpus.get("t1").unwrap();
    let graph = sentence.graph();
    let nodes = vec![graph.node_by_name("p").unwrap(), graph.node_by_name("t").unwrap()];
    let label = SubgraphLabel::of(graph, &nodes);
    let expected = model.translations().logp("worker", &label).unwrap().unwrap();
    let actual = model.trans_logp(sentence, 1, &nodes).unwrap();
    assert!((actual - expected).abs() < 1e-12, "{actual} vs {expected}");
}

#[test]
fn unseen_pairs_back_off_to_parts_with_a_discount() {
    let corpus = corpus(vec![worker_smiled(), school()]);
    let config = AlignConfig::default();
    let model = SubgraphModel::estimate(&config, &corpus, &gold(&corpus));

    let sentence = corpus.get("t1").unwrap();
    let graph = sentence.graph();
    let nodes = vec![graph.node_by_name("p").unwrap(), graph.node_by_name("t").unwrap()];
    // "smile" was never observed with the worker fragment.
    let parts = model.parts().subgraph_logp(graph, "smile", &nodes).unwrap();
    let expected = parts + config.partial_credit.ln();
    let actual = model.trans_logp(sentence, 2, &nodes).unwrap();
    assert!((actual - expected).abs() < 1e-12, "{actual} vs {expected}");
}

#[test]
fn multi_token_spans_back_off_to_their_best_lemma() {
    let corpus = corpus(vec![school(), high_school()]);
    let config = AlignConfig::default();
    let model = SubgraphModel::estimate(&config, &corpus, &gold(&corpus));

    let sentence = corpus.get("h1").unwrap();
    let graph = sentence.graph();
    let nodes = vec![graph.node_by_name("s").unwrap()];
    let label = SubgraphLabel::of(graph, &nodes);
    assert!(model.translations().logp("high school", &label).unwrap().is_none());

    let lemma = model.translations().logp("school", &label).unwrap().unwrap();
    let expected = lemma + config.partial_credit.ln();
    let actual = model.trans_logp(sentence, 0, &nodes).unwrap();
    assert!((actual - expected).abs() < 1e-12, "{actual} vs {expected}");
}

#[test]
fn reestimation_from_the_same_alignments_is_deterministic() {
    let corpus = corpus(vec![worker_smiled(), school()]);
    let config = AlignConfig::default();
    let gold = gold(&corpus);

    let first = SubgraphModel::estimate(&config, &corpus, &gold);
    let second = SubgraphModel::estimate(&config, &corpus, &gold);
    assert_eq!(first.translations(), second.translations());
    assert_eq!(first.parts(), second.parts());
    assert_eq!(first.distance().mean(), second.distance().mean());
    assert_eq!(first.distance().stdev(), second.distance().stdev());

    let relations = AlignmentCollection::new();
    let first = RelationModel::estimate(&config, &corpus, &gold, &relations);
    let second = RelationModel::estimate(&config, &corpus, &gold, &relations);
    assert_eq!(first.translations(), second.translations());
    assert!(first.translations().is_empty());
}

#[test]
fn zero_epochs_align_once_without_reports() {
    let corpus = corpus(vec![worker_smiled(), school()]);
    let config = AlignConfig::default();
    let mut task = SubgraphAligner::new(config.clone(), &corpus);
    let trainer = Trainer::new(&config).with_epochs(0);

    let (alignments, report) = trainer.train(&mut task, &corpus).unwrap();
    assert!(report.epochs.is_empty());
    assert!(!report.stopped_early);
    assert_eq!(alignments.len(), 2);
    for sentence in corpus.sentences() {
        alignments.get(sentence.id()).unwrap().validate(sentence).unwrap();
    }
    // Nothing was reestimated.
    assert!(task.model().translations().is_empty());
}

#[test]
fn each_epoch_is_reported_in_order() {
    let corpus = corpus(vec![worker_smiled(), school(), high_school()]);
    let config = AlignConfig::default();
    let mut task = SubgraphAligner::new(config.clone(), &corpus);
    let trainer = Trainer::new(&config).with_epochs(3);

    let (alignments, report) = trainer.train(&mut task, &corpus).unwrap();
    assert_eq!(report.task, "subgraphs");
    let epochs: Vec<usize> = report.epochs.iter().map(|e| e.epoch).collect();
    assert_eq!(epochs, vec![0, 1, 2]);
    for epoch in &report.epochs {
        assert!(epoch.perplexity.is_finite() && epoch.perplexity >= 1.0);
        assert_eq!(epoch.coverage.total, 5);
    }
    assert_eq!(alignments.len(), 3);
    assert!(!task.model().translations().is_empty());
}
